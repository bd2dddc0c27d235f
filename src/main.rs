//! whelk — 対話型 POSIX 風シェル
//!
//! REPL ループ: プロンプト表示 → 入力読み取り → 履歴追記 → パース → 実行
//!
//! 機能:
//! - 構文解析: クォート、エスケープ、パイプライン、リダイレクト（[`parser`]）
//! - コマンド実行: パイプ接続、fork/exec、ビルトイン混在（[`executor`]）
//! - ビルトイン: `exit`, `echo`, `type`, `pwd`, `cd`, `history`（[`builtins`]）
//! - 行エディタ: raw モード、Tab 補完、↑↓ 履歴、ハイライト（[`editor`]）
//!
//! [`parser`]: whelk::parser
//! [`executor`]: whelk::executor
//! [`builtins`]: whelk::builtins
//! [`editor`]: whelk::editor

use whelk::editor::LineEditor;
use whelk::executor;
use whelk::parser;
use whelk::shell::Shell;

fn main() {
    // 対話中の Ctrl+C でシェル自体が死なないよう SIGINT を無視する。
    // fork した子プロセスは SIG_DFL に戻す。
    unsafe {
        libc::signal(libc::SIGINT, libc::SIG_IGN);
    }

    let mut shell = Shell::new();
    let mut editor = LineEditor::new();

    loop {
        let line = match editor.read_line("$ ", &mut shell.history) {
            Some(line) => line,
            None => break, // EOF
        };

        // 履歴にはパース前の生の行を積む
        shell.history.add(&line);

        match parser::parse(&line) {
            Ok(Some(pipeline)) => executor::run(&mut shell, &pipeline),
            Ok(None) => continue,
            Err(_) => continue, // 構文エラーは出力なしでプロンプトへ戻る
        }

        if shell.should_exit {
            break;
        }
    }
    // exit / EOF とも終了ステータスは常に 0
}
