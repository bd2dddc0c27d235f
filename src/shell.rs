//! シェルのプロセス全体で共有される状態。

use crate::history::History;

/// シェルの実行状態。REPL ループ全体で共有される。
///
/// カレントディレクトリは OS のプロセス状態そのものを使うため
/// ここには持たない。
pub struct Shell {
    /// `exit` ビルトインで true になり、REPL ループを終了させる。
    pub should_exit: bool,
    /// セッション履歴。REPL が行を追記し、`history` ビルトインと
    /// 行エディタの ↑↓ ナビゲーションが参照する。
    pub history: History,
}

impl Shell {
    pub fn new() -> Self {
        Self {
            should_exit: false,
            history: History::new(),
        }
    }
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}
