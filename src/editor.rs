//! 行エディタ: raw モード、キー入力、バッファ操作、表示更新。
//!
//! 外部クレートに依存せず `libc`（termios, `read(2)`, `write(2)`,
//! `poll(2)`）のみで実装した `read-line` 能力。REPL は毎プロンプトで
//! [`LineEditor::read_line`] を呼ぶ。
//!
//! ## raw モードの範囲
//!
//! raw モードは `read_line` 内でのみ有効。[`RawMode`] の RAII ガードにより、
//! 正常復帰でもパニックでも元の termios 設定が復元される。コマンド実行中は
//! 子プロセスに通常の cooked モードのターミナルが渡る。
//!
//! ## 履歴の所有
//!
//! 履歴バッファは [`Shell`](crate::shell::Shell) 側の状態（`history`
//! ビルトインが書き換える）なので、エディタは所有せず `read_line` の
//! 引数として借りる。↑↓ ナビゲーションはその借用越しに行う。
//!
//! ## 非ターミナル入力
//!
//! stdin がターミナルでないとき（パイプ経由の駆動）は raw モードも
//! エスケープシーケンスも使わず、プロンプトを出して 1 行読むだけの
//! 経路に切り替わる。
//!
//! ## 表示更新
//!
//! 全行再描画方式。[`LineEditor::refresh_line`] がプロンプト +
//! ハイライト済みバッファを 1 回の `write(2)` で出力し、フリッカーを
//! 防止する。カーソル位置は raw バッファの文字数で計算し、ANSI
//! エスケープシーケンスのバイト数を含めない。

use std::io::{self, BufRead};

use crate::complete;
use crate::highlight::{self, PathCache};
use crate::history::History;

// ── RawMode ガード ────────────────────────────────────────────────

/// RAII ガードで raw モードを管理する。Drop で元の termios を復元する。
///
/// | フラグ | 操作 |
/// |--------|------|
/// | `c_iflag` | `BRKINT\|ICRNL\|INPCK\|ISTRIP\|IXON` OFF |
/// | `c_oflag` | `OPOST` ON のまま（`\n` → `\r\n` 変換を維持） |
/// | `c_cflag` | `CS8` ON |
/// | `c_lflag` | `ECHO\|ICANON\|IEXTEN\|ISIG` OFF |
/// | `VMIN`/`VTIME` | `1` / `0`（最低 1 バイトで即座に返る） |
struct RawMode {
    orig: libc::termios,
    fd: i32,
}

impl RawMode {
    fn enable(fd: i32) -> Self {
        let mut orig: libc::termios = unsafe { std::mem::zeroed() };
        unsafe {
            libc::tcgetattr(fd, &mut orig);
        }
        let mut raw = orig;
        raw.c_iflag &= !(libc::BRKINT | libc::ICRNL | libc::INPCK | libc::ISTRIP | libc::IXON);
        raw.c_cflag |= libc::CS8;
        raw.c_lflag &= !(libc::ECHO | libc::ICANON | libc::IEXTEN | libc::ISIG);
        raw.c_cc[libc::VMIN] = 1;
        raw.c_cc[libc::VTIME] = 0;
        unsafe {
            libc::tcsetattr(fd, libc::TCSAFLUSH, &raw);
        }
        Self { orig, fd }
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        unsafe {
            libc::tcsetattr(self.fd, libc::TCSAFLUSH, &self.orig);
        }
    }
}

// ── Key 入力 ──────────────────────────────────────────────────────

/// raw モードで読み取った 1 キー分の入力。
enum Key {
    /// 印字可能文字（ASCII + UTF-8 マルチバイト）。
    Char(char),
    Enter,
    Backspace,
    /// Delete キー（`ESC [ 3 ~`）。
    Delete,
    Left,
    Right,
    /// ↑ — 履歴を遡る。
    Up,
    /// ↓ — 履歴を進む。
    Down,
    Home,
    End,
    /// Tab — 補完トリガー。
    Tab,
    /// Ctrl+A — 行頭へ移動。
    CtrlA,
    /// Ctrl+C — 現在の入力を破棄して新しいプロンプト。
    CtrlC,
    /// Ctrl+D — 空バッファなら EOF。
    CtrlD,
    /// Ctrl+E — 行末へ移動。
    CtrlE,
    /// Ctrl+K — カーソルから行末まで削除。
    CtrlK,
    /// Ctrl+L — 画面クリア + 再描画。
    CtrlL,
    /// Ctrl+U — 行頭からカーソルまで削除。
    CtrlU,
    /// Ctrl+W — 直前の単語を削除。
    CtrlW,
    /// 未対応のバイト列。無視される。
    Unknown,
}

/// `libc::read` で 1 バイト読む。EOF またはエラー時は `None`。
fn read_byte(fd: i32) -> Option<u8> {
    let mut buf = [0u8; 1];
    let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, 1) };
    if n == 1 {
        Some(buf[0])
    } else {
        None
    }
}

/// ESC (`\x1b`) 後のエスケープシーケンスを解析する。
///
/// `poll(fd, POLLIN, 50ms)` で後続バイトの有無を判定し、タイムアウト
/// すれば ESC 単独として `Unknown` を返す。
fn read_escape_seq(fd: i32) -> Key {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let ready = unsafe { libc::poll(&mut pfd, 1, 50) };
    if ready <= 0 {
        return Key::Unknown;
    }

    if read_byte(fd) != Some(b'[') {
        return Key::Unknown;
    }

    match read_byte(fd) {
        Some(b'A') => Key::Up,
        Some(b'B') => Key::Down,
        Some(b'C') => Key::Right,
        Some(b'D') => Key::Left,
        Some(b'H') => Key::Home,
        Some(b'F') => Key::End,
        Some(d @ (b'1' | b'3' | b'4')) => {
            if read_byte(fd) == Some(b'~') {
                match d {
                    b'1' => Key::Home,
                    b'3' => Key::Delete,
                    _ => Key::End,
                }
            } else {
                Key::Unknown
            }
        }
        _ => Key::Unknown,
    }
}

/// UTF-8 マルチバイト文字の残りを読み取り `Key::Char` にする。
fn read_utf8(fd: i32, first: u8, expected_len: usize) -> Key {
    let mut buf = [0u8; 4];
    buf[0] = first;
    for slot in buf.iter_mut().take(expected_len).skip(1) {
        match read_byte(fd) {
            Some(b) => *slot = b,
            None => return Key::Unknown,
        }
    }
    match std::str::from_utf8(&buf[..expected_len]) {
        Ok(s) => s.chars().next().map_or(Key::Unknown, Key::Char),
        Err(_) => Key::Unknown,
    }
}

/// `fd` から 1 キー分のバイト列を読み取り [`Key`] に変換する。
fn read_key(fd: i32) -> Option<Key> {
    let byte = read_byte(fd)?;
    Some(match byte {
        b'\r' | b'\n' => Key::Enter,
        0x7f | 0x08 => Key::Backspace,
        0x1b => read_escape_seq(fd),
        0x09 => Key::Tab,
        1 => Key::CtrlA,
        3 => Key::CtrlC,
        4 => Key::CtrlD,
        5 => Key::CtrlE,
        11 => Key::CtrlK,
        12 => Key::CtrlL,
        21 => Key::CtrlU,
        23 => Key::CtrlW,
        b if (32..127).contains(&b) => Key::Char(b as char),
        // UTF-8 マルチバイト
        b if b & 0xE0 == 0xC0 => read_utf8(fd, b, 2),
        b if b & 0xF0 == 0xE0 => read_utf8(fd, b, 3),
        b if b & 0xF8 == 0xF0 => read_utf8(fd, b, 4),
        _ => Key::Unknown,
    })
}

// ── LineEditor ────────────────────────────────────────────────────

/// 行エディタ本体。入力バッファ、カーソル位置、PATH キャッシュを保持する。
///
/// [`PathCache`] はハイライトと補完で共有される。
pub struct LineEditor {
    /// 現在の入力テキスト。UTF-8 文字列。
    buf: String,
    /// カーソルのバイトオフセット。常に UTF-8 文字境界上にある。
    cursor: usize,
    /// 入力に使うファイルディスクリプタ（通常 `STDIN_FILENO`）。
    fd: i32,
    /// stdin がターミナルか。false なら素の行読み取りにフォールバック。
    interactive: bool,
    path_cache: PathCache,
}

impl LineEditor {
    pub fn new() -> Self {
        let fd = libc::STDIN_FILENO;
        Self {
            buf: String::new(),
            cursor: 0,
            fd,
            interactive: unsafe { libc::isatty(fd) } == 1,
            path_cache: PathCache::new(),
        }
    }

    /// プロンプトを表示し、1 行読み取る。
    /// Enter → `Some(line)`、EOF（Ctrl+D / 入力終端） → `None`。
    pub fn read_line(&mut self, prompt: &str, history: &mut History) -> Option<String> {
        if !self.interactive {
            return self.read_line_plain(prompt);
        }

        self.buf.clear();
        self.cursor = 0;
        history.reset_nav();
        self.path_cache.refresh();

        let _raw = RawMode::enable(self.fd);
        self.refresh_line(prompt);

        loop {
            let key = match read_key(self.fd) {
                Some(key) => key,
                None => {
                    // 読み取り終端: ターミナルが閉じられた
                    write_all("\n");
                    return None;
                }
            };
            match key {
                Key::Enter => {
                    write_all("\n");
                    return Some(self.buf.clone());
                }
                Key::CtrlD => {
                    if self.buf.is_empty() {
                        write_all("\n");
                        return None;
                    }
                }
                Key::CtrlC => {
                    write_all("^C\n");
                    self.buf.clear();
                    self.cursor = 0;
                    history.reset_nav();
                    self.refresh_line(prompt);
                    continue;
                }
                Key::Char(ch) => self.insert(ch),
                Key::Backspace => self.delete_before(),
                Key::Delete => self.delete_at(),
                Key::Left => self.move_left(),
                Key::Right => self.move_right(),
                Key::Home | Key::CtrlA => self.move_home(),
                Key::End | Key::CtrlE => self.move_end(),
                Key::Up => self.history_prev(history),
                Key::Down => self.history_next(history),
                Key::Tab => {
                    self.apply_completion(prompt);
                    continue;
                }
                Key::CtrlK => self.buf.truncate(self.cursor),
                Key::CtrlU => self.kill_to_start(),
                Key::CtrlW => self.kill_word_back(),
                Key::CtrlL => {
                    write_all("\x1b[2J\x1b[H");
                    self.refresh_line(prompt);
                    continue;
                }
                Key::Unknown => continue,
            }
            self.refresh_line(prompt);
        }
    }

    /// 非ターミナル入力用: プロンプトを出して素の 1 行を読む。
    fn read_line_plain(&mut self, prompt: &str) -> Option<String> {
        write_all(prompt);
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                if line.ends_with('\n') {
                    line.pop();
                }
                Some(line)
            }
        }
    }

    // ── バッファ操作 ──────────────────────────────────────────────

    /// カーソル位置に 1 文字挿入し、カーソルをその直後に進める。
    fn insert(&mut self, ch: char) {
        self.buf.insert(self.cursor, ch);
        self.cursor += ch.len_utf8();
    }

    /// Backspace: カーソル直前の 1 文字を削除する。行頭では何もしない。
    fn delete_before(&mut self) {
        if let Some(prev) = self.prev_char_boundary() {
            self.buf.remove(prev);
            self.cursor = prev;
        }
    }

    /// Delete: カーソル位置の 1 文字を削除する。行末では何もしない。
    fn delete_at(&mut self) {
        if self.cursor < self.buf.len() {
            self.buf.remove(self.cursor);
        }
    }

    /// カーソル直前の文字境界。行頭なら `None`。
    fn prev_char_boundary(&self) -> Option<usize> {
        self.buf[..self.cursor]
            .char_indices()
            .next_back()
            .map(|(i, _)| i)
    }

    fn move_left(&mut self) {
        if let Some(prev) = self.prev_char_boundary() {
            self.cursor = prev;
        }
    }

    fn move_right(&mut self) {
        if let Some(ch) = self.buf[self.cursor..].chars().next() {
            self.cursor += ch.len_utf8();
        }
    }

    /// Ctrl+A / Home: カーソルを行頭に移動する。
    fn move_home(&mut self) {
        self.cursor = 0;
    }

    /// Ctrl+E / End: カーソルを行末に移動する。
    fn move_end(&mut self) {
        self.cursor = self.buf.len();
    }

    /// Ctrl+U: 行頭からカーソルまで削除。
    fn kill_to_start(&mut self) {
        self.buf.drain(..self.cursor);
        self.cursor = 0;
    }

    /// Ctrl+W: 直前の単語を削除する。
    ///
    /// カーソル手前の空白をスキップし、次の空白まで（または行頭まで）を
    /// 削除する。
    fn kill_word_back(&mut self) {
        let chars: Vec<(usize, char)> = self.buf[..self.cursor].char_indices().collect();
        let mut idx = chars.len();
        while idx > 0 && chars[idx - 1].1 == ' ' {
            idx -= 1;
        }
        while idx > 0 && chars[idx - 1].1 != ' ' {
            idx -= 1;
        }
        let byte_pos = if idx == 0 { 0 } else { chars[idx].0 };
        self.buf.drain(byte_pos..self.cursor);
        self.cursor = byte_pos;
    }

    // ── 履歴ナビゲーション ────────────────────────────────────────

    /// ↑: 履歴を一つ遡る。初回は現在のバッファを保存する。
    fn history_prev(&mut self, history: &mut History) {
        if history.at_end() {
            let buf = self.buf.clone();
            history.save_current(&buf);
        }
        if let Some(entry) = history.prev().map(str::to_string) {
            self.buf = entry;
            self.cursor = self.buf.len();
        }
    }

    /// ↓: 履歴を一つ進む。末尾到達時は保存しておいたバッファを復元する。
    fn history_next(&mut self, history: &mut History) {
        if let Some(entry) = history.next().map(str::to_string) {
            self.buf = entry;
            self.cursor = self.buf.len();
        }
    }

    // ── Tab 補完 ──────────────────────────────────────────────────

    /// Tab 補完を実行する。
    ///
    /// - 候補 0 件 → ベル (`\x07`)
    /// - 候補 1 件 → 単語を候補で置換し、末尾にスペースを付加
    /// - 候補複数 → 共通接頭辞まで補完し、候補一覧を表示
    fn apply_completion(&mut self, prompt: &str) {
        let result = complete::complete(&self.buf, self.cursor, &self.path_cache);

        match result.candidates.len() {
            0 => write_all("\x07"),
            1 => {
                let replacement = format!("{} ", result.candidates[0]);
                self.buf
                    .replace_range(result.word_start..result.word_end, &replacement);
                self.cursor = result.word_start + replacement.len();
                self.refresh_line(prompt);
            }
            _ => {
                let common = complete::longest_common_prefix(&result.candidates).to_string();
                if common.len() > result.word_end - result.word_start {
                    self.buf
                        .replace_range(result.word_start..result.word_end, &common);
                    self.cursor = result.word_start + common.len();
                }
                let mut listing = String::from("\n");
                for (i, candidate) in result.candidates.iter().enumerate() {
                    if i > 0 {
                        listing.push_str("  ");
                    }
                    listing.push_str(candidate);
                }
                listing.push('\n');
                write_all(&listing);
                self.refresh_line(prompt);
            }
        }
    }

    // ── 表示更新 ──────────────────────────────────────────────────

    /// 全行を再描画する（1 回の `write(2)` で出力しフリッカーを防止）。
    ///
    /// 1. `\r` で行頭へ移動
    /// 2. プロンプト + ハイライト済みバッファを出力
    /// 3. `\x1b[K` で行末までクリア
    /// 4. `\x1b[{N}D` でカーソルを正しい位置へ戻す
    fn refresh_line(&self, prompt: &str) {
        let highlighted = highlight::highlight(&self.buf, &self.path_cache);

        let buf_chars = self.buf.chars().count();
        let cursor_chars = self.buf[..self.cursor].chars().count();
        let move_back = buf_chars - cursor_chars;

        let mut out = String::new();
        out.push('\r');
        out.push_str(prompt);
        out.push_str(&highlighted);
        out.push_str("\x1b[K");
        if move_back > 0 {
            out.push_str(&format!("\x1b[{}D", move_back));
        }

        write_all(&out);
    }
}

impl Default for LineEditor {
    fn default() -> Self {
        Self::new()
    }
}

/// `libc::write` で stdout に直接出力する（Rust 側バッファをバイパス）。
fn write_all(s: &str) {
    let bytes = s.as_bytes();
    let mut written = 0;
    while written < bytes.len() {
        let n = unsafe {
            libc::write(
                libc::STDOUT_FILENO,
                bytes[written..].as_ptr() as *const libc::c_void,
                bytes.len() - written,
            )
        };
        if n <= 0 {
            break;
        }
        written += n as usize;
    }
}

// ── Tests ─────────────────────────────────────────────────────────
