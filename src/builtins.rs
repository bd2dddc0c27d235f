//! ビルトインコマンドの実装。
//!
//! ビルトインは fork/exec を経由せずプロセス内で直接実行される。
//! [`exec`] が `Some(status)` を返せばビルトインとして処理済み、
//! `None` なら外部コマンドとして executor に委ねる。
//!
//! 通常出力は注入された `Write` シンクに書く（本番は stdout、テストは
//! `Vec<u8>`）。エラーメッセージは各ビルトイン固有の固定文字列で、
//! `pwd`/`history` は stderr、`cd` は観測された挙動に合わせて stdout に出す。
//!
//! プロセス状態を変更するビルトイン（`cd`, `exit`, 履歴を書き換える
//! `history`）は親プロセスで実行されることを前提とする。パイプライン中の
//! 非終端ステージに置かれた場合は子プロセス内で実行され、変更は子と共に
//! 消える。

use std::borrow::Cow;
use std::env;
use std::io::Write;
use std::path::Path;

use crate::resolve;
use crate::shell::Shell;

/// ビルトイン名の一覧（アルファベット順）。補完候補にもこの表を使う。
pub const BUILTINS: &[&str] = &["cd", "echo", "exit", "history", "pwd", "type"];

/// `name` がビルトインか。
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// ビルトインコマンドの実行を試みる。
///
/// 戻り値:
/// - `Some(status)` — ビルトインとして実行済み
/// - `None` — 該当するビルトインなし（外部コマンドとして実行すべき）
pub fn exec(shell: &mut Shell, words: &[&str], out: &mut dyn Write) -> Option<i32> {
    let status = match words[0] {
        "exit" => builtin_exit(shell),
        "echo" => builtin_echo(&words[1..], out),
        "type" => builtin_type(&words[1..], out),
        "pwd" => builtin_pwd(out),
        "cd" => builtin_cd(words.get(1).copied(), out),
        "history" => builtin_history(shell, &words[1..], out),
        _ => return None,
    };
    // シェル出力は常に unbuffered
    let _ = out.flush();
    Some(status)
}

/// `exit [code]` — REPL を終了させる。引数は受け付けるが無視する
/// （シェル自体は常にステータス 0 で終わる）。
fn builtin_exit(shell: &mut Shell) -> i32 {
    shell.should_exit = true;
    0
}

/// `echo [words…]` — 引数を単一スペースで連結し、改行を付けて出力する。
fn builtin_echo(args: &[&str], out: &mut dyn Write) -> i32 {
    let _ = writeln!(out, "{}", args.join(" "));
    0
}

/// `type <name>…` — 各名前がビルトインか、`$PATH` 上のどこにあるかを表示する。
fn builtin_type(names: &[&str], out: &mut dyn Write) -> i32 {
    for name in names {
        if is_builtin(name) {
            let _ = writeln!(out, "{} is a shell builtin", name);
        } else {
            match resolve::resolve(name) {
                Some(path) => {
                    let _ = writeln!(out, "{} is {}", name, path.display());
                }
                None => {
                    let _ = writeln!(out, "{}: not found", name);
                }
            }
        }
    }
    0
}

/// `pwd` — カレントディレクトリを表示する。
fn builtin_pwd(out: &mut dyn Write) -> i32 {
    match env::current_dir() {
        Ok(dir) => {
            let _ = writeln!(out, "{}", dir.display());
            0
        }
        Err(_) => {
            eprintln!("pwd: error getting current directory");
            1
        }
    }
}

/// `cd [path]` — カレントディレクトリを変更する。引数省略時は `~`。
///
/// 失敗時のメッセージは stdout（シンク）に出す。入力されたままのパスを
/// メッセージに使う（チルダ展開後ではなく）。
fn builtin_cd(path: Option<&str>, out: &mut dyn Write) -> i32 {
    let path = path.unwrap_or("~");
    let target = expand_tilde(path);
    if env::set_current_dir(Path::new(target.as_ref())).is_err() {
        let _ = writeln!(out, "cd: {}: No such file or directory", path);
        1
    } else {
        0
    }
}

/// `~` / `~/...` の先頭を `$HOME` に置き換える。`HOME` 未設定なら
/// そのまま返す。
fn expand_tilde(path: &str) -> Cow<'_, str> {
    if path == "~" || path.starts_with("~/") {
        if let Ok(home) = env::var("HOME") {
            return Cow::Owned(format!("{}{}", home, &path[1..]));
        }
    }
    Cow::Borrowed(path)
}

/// `history [N | -r f | -w f | -a f]` — 履歴の表示とファイル入出力。
fn builtin_history(shell: &mut Shell, args: &[&str], out: &mut dyn Write) -> i32 {
    match args {
        [] => {
            let _ = shell.history.render(None, out);
            0
        }
        ["-r", file, ..] => {
            if shell.history.read_from(Path::new(file)).is_err() {
                eprintln!("history: {}: No such file or directory", file);
                return 1;
            }
            0
        }
        ["-w", file, ..] => {
            if shell.history.write_to(Path::new(file)).is_err() {
                eprintln!("history: {}: cannot create", file);
                return 1;
            }
            0
        }
        ["-a", file, ..] => {
            if shell.history.append_to(Path::new(file)).is_err() {
                eprintln!("history: {}: cannot create", file);
                return 1;
            }
            0
        }
        [n, ..] => {
            match n.parse::<usize>() {
                Ok(n) => {
                    let _ = shell.history.render(Some(n), out);
                    0
                }
                // 数値でもオプションでもない引数は黙って無視する
                Err(_) => 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(shell: &mut Shell, words: &[&str]) -> (Option<i32>, String) {
        let mut out = Vec::new();
        let status = exec(shell, words, &mut out);
        (status, String::from_utf8(out).unwrap())
    }

    #[test]
    fn unknown_command_is_not_handled() {
        let mut shell = Shell::new();
        let (status, out) = run(&mut shell, &["ls"]);
        assert_eq!(status, None);
        assert!(out.is_empty());
    }

    #[test]
    fn echo_joins_with_single_spaces() {
        let mut shell = Shell::new();
        let (status, out) = run(&mut shell, &["echo", "hello   world", "a b"]);
        assert_eq!(status, Some(0));
        assert_eq!(out, "hello   world a b\n");
    }

    #[test]
    fn echo_no_args_prints_newline() {
        let mut shell = Shell::new();
        let (_, out) = run(&mut shell, &["echo"]);
        assert_eq!(out, "\n");
    }

    #[test]
    fn exit_sets_flag_and_ignores_code() {
        let mut shell = Shell::new();
        let (status, out) = run(&mut shell, &["exit", "42"]);
        assert_eq!(status, Some(0));
        assert!(out.is_empty());
        assert!(shell.should_exit);
    }

    #[test]
    fn type_reports_builtins() {
        let mut shell = Shell::new();
        let (_, out) = run(&mut shell, &["type", "echo", "cd"]);
        assert_eq!(out, "echo is a shell builtin\ncd is a shell builtin\n");
    }

    #[test]
    fn type_reports_not_found() {
        let mut shell = Shell::new();
        let (_, out) = run(&mut shell, &["type", "whelk-no-such-program"]);
        assert_eq!(out, "whelk-no-such-program: not found\n");
    }

    #[test]
    fn every_builtin_name_is_dispatchable() {
        for name in BUILTINS {
            assert!(is_builtin(name));
        }
        assert!(!is_builtin("ls"));
    }

    #[test]
    fn cd_failure_message_goes_to_sink() {
        let mut shell = Shell::new();
        let (status, out) = run(&mut shell, &["cd", "/whelk/no/such/dir"]);
        assert_eq!(status, Some(1));
        // メッセージは stderr ではなくシンク（stdout）側
        assert_eq!(out, "cd: /whelk/no/such/dir: No such file or directory\n");
    }

    #[test]
    fn cd_pwd_and_tilde() {
        // カレントディレクトリを動かすテストはレースを避けるため
        // 1 つのテストに直列化する
        let original = env::current_dir().unwrap();
        let dir = std::env::temp_dir()
            .join(format!("whelk-builtins-cd-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let canonical = dir.canonicalize().unwrap();

        let mut shell = Shell::new();

        // cd <path> → pwd が移動先を表示する
        let (status, _) = run(&mut shell, &["cd", dir.to_str().unwrap()]);
        assert_eq!(status, Some(0));
        let (_, out) = run(&mut shell, &["pwd"]);
        assert_eq!(out.trim_end(), canonical.display().to_string());

        // cd ~ → $HOME へ移動
        let saved_home = env::var("HOME").ok();
        env::set_var("HOME", &canonical);
        env::set_current_dir("/").unwrap();
        let (status, out) = run(&mut shell, &["cd", "~"]);
        assert_eq!(status, Some(0));
        assert!(out.is_empty());
        assert_eq!(env::current_dir().unwrap(), canonical);

        match saved_home {
            Some(home) => env::set_var("HOME", home),
            None => env::remove_var("HOME"),
        }
        env::set_current_dir(&original).unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn tilde_expansion_rules() {
        // HOME に依存しない形だけ確認する
        assert_eq!(expand_tilde("plain"), "plain");
        assert_eq!(expand_tilde("~user"), "~user"); // ~user 形式は展開しない
        assert_eq!(expand_tilde("a/~/b"), "a/~/b");
    }

    #[test]
    fn history_renders_session_lines() {
        let mut shell = Shell::new();
        shell.history.add("echo one");
        shell.history.add("echo two");
        let (_, out) = run(&mut shell, &["history"]);
        assert_eq!(out, "    1  echo one\n    2  echo two\n");
        let (_, out) = run(&mut shell, &["history", "1"]);
        assert_eq!(out, "    2  echo two\n");
    }

    #[test]
    fn history_read_missing_file_fails() {
        let mut shell = Shell::new();
        let (status, out) = run(&mut shell, &["history", "-r", "/whelk/no/such/file"]);
        assert_eq!(status, Some(1));
        assert!(out.is_empty());
        assert!(shell.history.is_empty());
    }

    #[test]
    fn history_write_and_read_back() {
        let path = std::env::temp_dir()
            .join(format!("whelk-builtins-hist-{}", std::process::id()));
        let file = path.display().to_string();

        let mut shell = Shell::new();
        shell.history.add("first");
        shell.history.add("second");
        let (status, _) = run(&mut shell, &["history", "-w", file.as_str()]);
        assert_eq!(status, Some(0));

        let (_, _) = run(&mut shell, &["history", "-r", file.as_str()]);
        let (_, out) = run(&mut shell, &["history"]);
        // -w の全 2 件が -r でバッファ末尾に再追加される
        assert_eq!(
            out,
            "    1  first\n    2  second\n    3  first\n    4  second\n",
        );
        std::fs::remove_file(&path).unwrap();
    }
}
