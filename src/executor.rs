//! コマンド実行: ビルトイン判定、リダイレクト適用、パイプライン接続、
//! 子プロセスの fork / exec / wait。
//!
//! ## ディスパッチ
//!
//! - 単一コマンド（[`run_single`]）: 親プロセスで [`RedirectGuard`] を張り、
//!   ビルトインならプロセス内で直接実行、外部コマンドなら fork + `execv`。
//!   ガードは成功・失敗どちらの経路でも fd を復元する。
//! - パイプライン（[`run_pipeline`]）:
//!   1. 全ステージの外部コマンドを事前解決（1 つでも見つからなければ
//!      fork せずに中止）
//!   2. N−1 本のパイプを作成（8 段以下はスタック配列、超過時はヒープ）
//!   3. 各ステージを fork し、子側でパイプを dup2 → 全パイプ端を close →
//!      ステージ固有のリダイレクトを適用（fd 1 へのファイルリダイレクトは
//!      パイプ接続を上書き）→ ビルトインは子プロセス内で実行して status 0、
//!      外部コマンドは `execv`（argv[0] は入力されたコマンド名のまま）
//!   4. 親側で全パイプ端を close し、spawn 順に waitpid
//!
//! パイプ端を親で閉じ切ってから wait するのはデッドロック回避の要:
//! 書き込み端が親に残っていると下流ステージが EOF を観測できない。
//!
//! 子プロセスの終了ステータスは収集するだけで報告しない。

use std::ffi::CString;
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::builtins;
use crate::parser::{Command, Pipeline};
use crate::redirect::{self, RedirectGuard};
use crate::resolve;
use crate::shell::Shell;

/// パイプラインを実行する。子プロセスの完了まで戻らない。
pub fn run(shell: &mut Shell, pipeline: &Pipeline<'_>) {
    if pipeline.commands.len() == 1 {
        run_single(shell, &pipeline.commands[0]);
    } else {
        run_pipeline(shell, pipeline);
    }
}

// ── 単一コマンド経路 ────────────────────────────────────────────────

/// 単一コマンドを実行する。リダイレクトは親の fd に適用してから
/// ディスパッチし、終了時に復元する。
fn run_single(shell: &mut Shell, cmd: &Command<'_>) {
    let words: Vec<&str> = cmd.words.iter().map(|w| w.as_ref()).collect();
    let _guard = RedirectGuard::apply(cmd);

    if builtins::is_builtin(words[0]) {
        let _ = builtins::exec(shell, &words, &mut io::stdout());
        return;
    }

    let Some(path) = resolve::resolve(words[0]) else {
        // 単一コマンドの解決失敗は stdout（リダイレクト適用後の fd 1）
        println!("{}: command not found", words[0]);
        let _ = io::stdout().flush();
        return;
    };

    let pid = unsafe { libc::fork() };
    if pid < 0 {
        eprintln!("Fork failed");
        return;
    }
    if pid == 0 {
        // 子: リダイレクト済みの fd を継承している
        unsafe {
            libc::signal(libc::SIGINT, libc::SIG_DFL);
        }
        exec_external(&path, &words);
    }
    unsafe {
        libc::waitpid(pid, std::ptr::null_mut(), 0);
    }
}

// ── パイプライン経路 ────────────────────────────────────────────────

/// 各ステージの外部コマンドを事前解決する。ビルトインのステージは `None`。
///
/// 1 つでも解決に失敗したらメッセージを stderr に出して `None` を返す
/// （パイプライン全体を中止する）。
fn preresolve(pipeline: &Pipeline<'_>) -> Option<Vec<Option<PathBuf>>> {
    let mut resolved = Vec::with_capacity(pipeline.commands.len());
    for cmd in &pipeline.commands {
        let name = cmd.words[0].as_ref();
        if builtins::is_builtin(name) {
            resolved.push(None);
        } else {
            match resolve::resolve(name) {
                Some(path) => resolved.push(Some(path)),
                None => {
                    eprintln!("{}: command not found", name);
                    return None;
                }
            }
        }
    }
    Some(resolved)
}

/// 複数ステージのパイプラインを実行する。
fn run_pipeline(shell: &mut Shell, pipeline: &Pipeline<'_>) {
    let n = pipeline.commands.len();

    let Some(resolved) = preresolve(pipeline) else {
        return;
    };

    // ── パイプ作成（8 段以下はスタック配列、超過時はヒープフォールバック）──
    let pipe_count = n - 1;
    let mut pipe_stack: [[i32; 2]; 7] = [[-1; 2]; 7];
    let mut pipe_heap: Vec<[i32; 2]> = Vec::new();
    let pipes: &mut [[i32; 2]] = if pipe_count <= 7 {
        &mut pipe_stack[..pipe_count]
    } else {
        pipe_heap.resize(pipe_count, [-1; 2]);
        &mut pipe_heap
    };

    for i in 0..pipe_count {
        if unsafe { libc::pipe(pipes[i].as_mut_ptr()) } != 0 {
            eprintln!("whelk: pipe: {}", io::Error::last_os_error());
            close_pipes(pipes);
            return;
        }
    }

    // 子の stdout 書き込みと親の stdout バッファが混線しないよう吐き出す
    let _ = io::stdout().flush();

    // ── fork ──
    let mut pids: Vec<libc::pid_t> = Vec::with_capacity(n);
    for (i, cmd) in pipeline.commands.iter().enumerate() {
        let pid = unsafe { libc::fork() };
        if pid < 0 {
            eprintln!("Fork failed");
            continue; // このステージは放棄し、残りは実行する
        }
        if pid == 0 {
            run_stage(shell, cmd, resolved[i].as_deref(), pipes, i, n);
        }
        pids.push(pid);
    }

    // ── 親の後始末: 全パイプ端を閉じてから spawn 順に wait ──
    close_pipes(pipes);
    for pid in pids {
        unsafe {
            libc::waitpid(pid, std::ptr::null_mut(), 0);
        }
    }
}

/// fork 直後の子プロセス側: パイプを配線し、ステージを実行して exit する。
fn run_stage(
    shell: &mut Shell,
    cmd: &Command<'_>,
    path: Option<&Path>,
    pipes: &[[i32; 2]],
    i: usize,
    n: usize,
) -> ! {
    unsafe {
        libc::signal(libc::SIGINT, libc::SIG_DFL);
        if i > 0 {
            libc::dup2(pipes[i - 1][0], libc::STDIN_FILENO);
        }
        if i < n - 1 {
            libc::dup2(pipes[i][1], libc::STDOUT_FILENO);
        }
        for p in pipes {
            libc::close(p[0]);
            libc::close(p[1]);
        }
    }

    // ステージ固有のリダイレクト。fd 1 へのファイルリダイレクトは
    // 直前に張ったパイプ接続を上書きする
    redirect::apply_in_child(cmd);

    let words: Vec<&str> = cmd.words.iter().map(|w| w.as_ref()).collect();
    match path {
        Some(path) => exec_external(path, &words),
        None => {
            // ビルトインは子プロセス内で実行し、常に status 0 で終了。
            // Rust の stdout ロックは fork をまたぐと危険なので
            // fd 1 に直接書く
            let mut out = FdWriter(libc::STDOUT_FILENO);
            let _ = builtins::exec(shell, &words, &mut out);
            unsafe { libc::_exit(0) }
        }
    }
}

// ── exec ────────────────────────────────────────────────────────────

/// argv 用の NULL 終端ポインタ配列。`CString` の寿命で配列を支える。
struct CStringVec {
    _strings: Vec<CString>,
    ptrs: Vec<*const libc::c_char>,
}

impl CStringVec {
    fn from_words(words: &[&str]) -> Self {
        let strings: Vec<CString> = words
            .iter()
            .map(|w| CString::new(*w).unwrap_or_else(|_| CString::default()))
            .collect();
        let mut ptrs: Vec<*const libc::c_char> = strings.iter().map(|s| s.as_ptr()).collect();
        ptrs.push(std::ptr::null());
        Self {
            _strings: strings,
            ptrs,
        }
    }

    fn as_ptr(&self) -> *const *const libc::c_char {
        self.ptrs.as_ptr()
    }
}

/// 解決済みパスを `execv` する。argv[0] には解決後のパスではなく
/// 入力されたコマンド名をそのまま渡す。戻ってきたら exec 失敗。
fn exec_external(path: &Path, words: &[&str]) -> ! {
    let prog = CString::new(path.as_os_str().as_bytes())
        .unwrap_or_else(|_| CString::default());
    let argv = CStringVec::from_words(words);
    unsafe {
        libc::execv(prog.as_ptr(), argv.as_ptr());
    }
    eprintln!("Failed to execute {}", path.display());
    std::process::exit(1);
}

/// 生の fd に直接書く `Write` 実装。子プロセス内のビルトイン出力用。
struct FdWriter(i32);

impl Write for FdWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = unsafe {
            libc::write(self.0, buf.as_ptr() as *const libc::c_void, buf.len())
        };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// スライス内の全パイプ端を閉じる（未作成の -1 はスキップ）。
fn close_pipes(pipes: &mut [[i32; 2]]) {
    for p in pipes.iter_mut() {
        for end in p.iter_mut() {
            if *end >= 0 {
                unsafe {
                    libc::close(*end);
                }
                *end = -1;
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
