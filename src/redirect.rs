//! リダイレクトの適用と復元。
//!
//! 親プロセスで実行されるコマンド（単一コマンド経路）には
//! [`RedirectGuard`] を使う。RAII ガードが現在の fd を `dup` で退避し、
//! ターゲットファイルを `dup2` で fd 1/2 に重ね、Drop 時に元へ戻す。
//! 正常終了・早期 return・パニックのどの経路でも復元される。
//!
//! パイプラインの子プロセスには [`apply_in_child`] を使う。子は exec or
//! exit するので退避・復元は行わない。
//!
//! ターゲットのオープンに失敗した場合、そのリダイレクトは放棄され、
//! コマンドは元のストリームのまま実行される（メッセージも出さない）。

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;

use crate::parser::{Command, Redirect, RedirectMode};

/// リダイレクトターゲットを開く。truncate / append とも create、モード 0644。
pub fn open_target(redirect: &Redirect<'_>) -> io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.write(true).create(true).mode(0o644);
    match redirect.mode {
        RedirectMode::Truncate => opts.truncate(true),
        RedirectMode::Append => opts.append(true),
    };
    opts.open(redirect.target.as_ref())
}

/// コマンドの (fd, リダイレクト指定) ペアを列挙する。
fn redirect_pairs<'a, 'b>(cmd: &'b Command<'a>) -> [(i32, &'b Option<Redirect<'a>>); 2] {
    [(libc::STDOUT_FILENO, &cmd.stdout), (libc::STDERR_FILENO, &cmd.stderr)]
}

/// Rust 側の stdout/stderr バッファを fd 切り替えの前に吐き出す。
fn flush_std_streams() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}

// ── RedirectGuard ───────────────────────────────────────────────────

/// 親プロセス用のスコープ付きリダイレクト。
///
/// [`RedirectGuard::apply`] で fd を退避してターゲットを重ね、
/// Drop で復元する。ガードが生きている間のコマンド出力は
/// ターゲットファイルに入る。
pub struct RedirectGuard {
    /// (リダイレクトした fd, 退避先の fd)。適用順。
    saved: Vec<(i32, i32)>,
}

impl RedirectGuard {
    /// コマンドのリダイレクトを fd 1/2 に適用する。
    ///
    /// ターゲットを開けなかった分は黙ってスキップされ、その fd は
    /// 元のまま残る。開いた `File` はスコープを抜けると閉じられ、
    /// `dup2` で重ねた複製だけが残る。
    pub fn apply(cmd: &Command<'_>) -> Self {
        let mut saved = Vec::new();
        for (fd, redirect) in redirect_pairs(cmd) {
            let Some(redirect) = redirect else { continue };
            let Ok(file) = open_target(redirect) else { continue };
            flush_std_streams();
            let backup = unsafe { libc::dup(fd) };
            if backup < 0 {
                continue;
            }
            unsafe {
                libc::dup2(file.as_raw_fd(), fd);
            }
            saved.push((fd, backup));
        }
        Self { saved }
    }
}

impl Drop for RedirectGuard {
    fn drop(&mut self) {
        flush_std_streams();
        for &(fd, backup) in self.saved.iter().rev() {
            unsafe {
                libc::dup2(backup, fd);
                libc::close(backup);
            }
        }
    }
}

// ── 子プロセス側 ────────────────────────────────────────────────────

/// fork 後の子プロセスでリダイレクトを適用する（復元なし）。
///
/// fd 1 へのファイルリダイレクトは、先に張られたパイプ接続を上書きする。
pub fn apply_in_child(cmd: &Command<'_>) {
    for (fd, redirect) in redirect_pairs(cmd) {
        let Some(redirect) = redirect else { continue };
        let Ok(file) = open_target(redirect) else { continue };
        unsafe {
            libc::dup2(file.as_raw_fd(), fd);
        }
        // file は drop で閉じる。dup2 の複製は生き続ける。
    }
}
