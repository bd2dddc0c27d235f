//! セッション履歴の管理。
//!
//! 履歴はセッション寿命の追記専用バッファで、各エントリは 1 始まりの
//! 固定インデックスを持つ（再採番されない）。`history -a` 用に
//! 「どこまで外部ファイルに追記済みか」を示すカーソルを併せて保持する。
//!
//! ファイル入出力は `history` ビルトインから明示的に行う:
//!
//! | 操作 | 意味 |
//! |------|------|
//! | [`History::read_from`] | ファイルの非空行をバッファ末尾に追加（`-r`） |
//! | [`History::write_to`] | バッファ全体を truncate 書き込み（`-w`） |
//! | [`History::append_to`] | 前回 `-a` 以降のエントリのみ追記（`-a`） |
//!
//! ## ナビゲーション
//!
//! 行エディタの ↑↓ 用に `nav_index` と `saved_buf` を持つ。
//! `nav_index == entries.len()` は「まだ履歴に入っていない」状態を表し、
//! ↓で末尾まで戻ると編集途中だった入力（`saved_buf`）を復元する。

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

/// 履歴エントリの最初のインデックス。
const HISTORY_BASE: usize = 1;

/// セッション履歴バッファ。
pub struct History {
    /// エントリのリスト(古い順)。`entries[k]` のインデックスは `HISTORY_BASE + k`。
    entries: Vec<String>,
    /// `history -a` で出力済みの最大インデックス。未追記なら `None`。
    last_appended: Option<usize>,
    /// 現在のナビゲーション位置。`entries.len()` は「現在の入力」を意味する。
    nav_index: usize,
    /// ↑で履歴に入る前の入力バッファ。↓で末尾に戻ったときに復元する。
    saved_buf: String,
}

impl History {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            last_appended: None,
            nav_index: 0,
            saved_buf: String::new(),
        }
    }

    /// エントリを追加する。空白のみの行はスキップ（行はそのまま保存）。
    pub fn add(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        self.entries.push(line.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ── 表示 ──────────────────────────────────────────────────────

    /// 末尾 `last` 件（`None` なら全件）を `    <index>  <line>` 形式で出力する。
    pub fn render(&self, last: Option<usize>, out: &mut dyn Write) -> io::Result<()> {
        let skip = match last {
            Some(n) => self.entries.len().saturating_sub(n),
            None => 0,
        };
        for (k, line) in self.entries.iter().enumerate().skip(skip) {
            writeln!(out, "    {}  {}", HISTORY_BASE + k, line)?;
        }
        Ok(())
    }

    // ── ファイル入出力 ────────────────────────────────────────────

    /// ファイルの非空行をバッファ末尾に追加する（`history -r`）。
    pub fn read_from(&mut self, path: &Path) -> io::Result<()> {
        let reader = BufReader::new(fs::File::open(path)?);
        for line in reader.lines() {
            let line = line?;
            if !line.is_empty() {
                self.entries.push(line);
            }
        }
        Ok(())
    }

    /// バッファ全体をファイルに truncate 書き込みする（`history -w`）。
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        let mut file = fs::File::create(path)?;
        for line in &self.entries {
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }

    /// 前回 `-a` 以降のエントリをファイルに追記する（`history -a`）。
    ///
    /// 出力対象はインデックスが `last_appended` より大きいエントリ
    /// （未追記なら先頭から全件）。成功時にカーソルを進める。
    pub fn append_to(&mut self, path: &Path) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let skip = match self.last_appended {
            Some(idx) => idx + 1 - HISTORY_BASE,
            None => 0,
        };
        for line in self.entries.iter().skip(skip) {
            writeln!(file, "{}", line)?;
        }
        if !self.entries.is_empty() {
            self.last_appended = Some(HISTORY_BASE + self.entries.len() - 1);
        }
        Ok(())
    }

    // ── ナビゲーション ────────────────────────────────────────────

    /// ナビゲーション状態をリセットする（`read_line` 開始時に呼ぶ）。
    pub fn reset_nav(&mut self) {
        self.nav_index = self.entries.len();
        self.saved_buf.clear();
    }

    /// 現在の入力バッファを保存する（初回 ↑ 時）。
    pub fn save_current(&mut self, buf: &str) {
        self.saved_buf = buf.to_string();
    }

    /// ナビゲーション位置が末尾（= まだ履歴に入っていない）か。
    pub fn at_end(&self) -> bool {
        self.nav_index == self.entries.len()
    }

    /// ↑: 一つ前のエントリを返す。先頭なら `None`。
    pub fn prev(&mut self) -> Option<&str> {
        if self.nav_index > 0 {
            self.nav_index -= 1;
            Some(&self.entries[self.nav_index])
        } else {
            None
        }
    }

    /// ↓: 一つ次のエントリを返す。末尾到達時は `saved_buf` を復元する。
    pub fn next(&mut self) -> Option<&str> {
        if self.nav_index < self.entries.len() {
            self.nav_index += 1;
            if self.nav_index == self.entries.len() {
                Some(&self.saved_buf)
            } else {
                Some(&self.entries[self.nav_index])
            }
        } else {
            None
        }
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}
