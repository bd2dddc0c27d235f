//! シンタックスハイライト（ANSI カラー付き出力生成）と `$PATH` キャッシュ。
//!
//! バッファを走査し、文法のサブセットに沿って各トークンに色を付ける:
//!
//! | 要素 | 色 | ANSI コード |
//! |------|------|------------|
//! | 有効なコマンド（ビルトイン or PATH 内） | 太字緑 | `\x1b[1;32m` |
//! | 無効なコマンド | 太字赤 | `\x1b[1;31m` |
//! | クォート内 | 黄 | `\x1b[33m` |
//! | `\|` とリダイレクト演算子 | シアン | `\x1b[36m` |
//! | 引数・リダイレクト先 | デフォルト | （色なし） |
//!
//! 可視文字数は入力と同一に保つ（エスケープシーケンスは端末が解釈する）。
//! カーソル位置の計算には元のバッファの文字数を使うこと。
//!
//! 状態は 2 フラグで管理する:
//! - `command_position`: 次のワードをコマンドとして着色（行頭 or `|` 後）
//! - `redirect_target`: 次のワードをリダイレクト先として着色なし（演算子後）

use std::collections::HashSet;
use std::os::unix::fs::PermissionsExt;

use crate::builtins;

// ── ANSI カラーコード ─────────────────────────────────────────────

const GREEN_BOLD: &str = "\x1b[1;32m";
const RED_BOLD: &str = "\x1b[1;31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

// ── PATH キャッシュ ───────────────────────────────────────────────

/// `$PATH` 内の実行可能コマンド名をキャッシュする。
///
/// `$PATH` が変更されたら自動的に再構築する。ハイライト（コマンドの
/// 有効性判定）と Tab 補完（候補列挙）で共有される。
/// 判定はいずれかのクラスの実行ビット（`0o111`）。
pub struct PathCache {
    /// `$PATH` 内の全実行可能コマンド名。
    commands: HashSet<String>,
    /// キャッシュ構築時の `$PATH` 値。変更検出に使う。
    path_str: String,
}

impl PathCache {
    pub fn new() -> Self {
        let mut cache = Self {
            commands: HashSet::new(),
            path_str: String::new(),
        };
        cache.refresh();
        cache
    }

    /// `$PATH` が変更されていればキャッシュを再構築する。
    /// 読めないディレクトリは黙ってスキップする。
    pub fn refresh(&mut self) {
        let current = std::env::var("PATH").unwrap_or_default();
        if current == self.path_str && !self.commands.is_empty() {
            return;
        }
        self.path_str = current;
        self.commands.clear();
        for dir in self.path_str.split(':') {
            if dir.is_empty() {
                continue;
            }
            let Ok(entries) = std::fs::read_dir(dir) else { continue };
            for entry in entries.flatten() {
                if let Ok(name) = entry.file_name().into_string() {
                    if is_executable(&entry.path()) {
                        self.commands.insert(name);
                    }
                }
            }
        }
    }

    /// コマンド名がキャッシュに存在するか。
    pub fn has_command(&self, name: &str) -> bool {
        self.commands.contains(name)
    }

    /// `prefix` で始まるコマンド名をソート済みで返す。
    pub fn commands_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut matches: Vec<String> = self
            .commands
            .iter()
            .filter(|cmd| cmd.starts_with(prefix))
            .cloned()
            .collect();
        matches.sort();
        matches
    }
}

impl Default for PathCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl PathCache {
    /// テスト用: `$PATH` を読まず、固定のコマンド集合を持つキャッシュを作る。
    pub(crate) fn with_commands(names: &[&str]) -> Self {
        Self {
            commands: names.iter().map(|s| s.to_string()).collect(),
            path_str: String::new(),
        }
    }
}

/// ファイルが実行可能か（いずれかのクラスの実行ビット `0o111`）。
fn is_executable(path: &std::path::Path) -> bool {
    match path.metadata() {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

/// コマンド名が有効か（ビルトイン or PATH 内に存在）。
pub fn is_valid_command(word: &str, cache: &PathCache) -> bool {
    builtins::is_builtin(word) || cache.has_command(word)
}

// ── ハイライト本体 ────────────────────────────────────────────────

/// ワードがリダイレクト演算子そのものか（`>`, `1>`, `>>`, `1>>`, `2>`, `2>>`）。
fn is_redirect_op(word: &str) -> bool {
    matches!(word, ">" | "1>" | ">>" | "1>>" | "2>" | "2>>")
}

/// バッファ全体をハイライトし、ANSI エスケープ付き文字列を返す。
pub fn highlight(buf: &str, cache: &PathCache) -> String {
    let bytes = buf.as_bytes();
    let len = bytes.len();
    let mut result = String::with_capacity(buf.len() * 2);
    let mut pos = 0;
    let mut command_position = true;
    let mut redirect_target = false;

    while pos < len {
        match bytes[pos] {
            b' ' | b'\t' => {
                result.push(bytes[pos] as char);
                pos += 1;
            }
            b'|' => {
                result.push_str(CYAN);
                result.push('|');
                result.push_str(RESET);
                pos += 1;
                command_position = true;
                redirect_target = false;
            }
            b'\'' | b'"' => {
                let quote = bytes[pos];
                result.push_str(YELLOW);
                result.push(quote as char);
                pos += 1;
                while pos < len && bytes[pos] != quote {
                    // ダブルクォート内の \" はクォートを閉じない
                    if quote == b'"' && bytes[pos] == b'\\' && pos + 1 < len {
                        result.push('\\');
                        pos += 1;
                    }
                    push_char(&mut result, buf, &mut pos);
                }
                if pos < len {
                    result.push(quote as char);
                    pos += 1;
                }
                result.push_str(RESET);
                command_position = false;
                redirect_target = false;
            }
            _ => {
                // 通常ワード（エスケープを含みうる）
                let word_start = pos;
                while pos < len {
                    match bytes[pos] {
                        b' ' | b'\t' | b'|' | b'\'' | b'"' => break,
                        b'\\' if pos + 1 < len => pos += 2,
                        _ => pos += 1,
                    }
                }
                let word = &buf[word_start..pos.min(len)];

                if is_redirect_op(word) {
                    result.push_str(CYAN);
                    result.push_str(word);
                    result.push_str(RESET);
                    redirect_target = true;
                } else if redirect_target {
                    result.push_str(word);
                    redirect_target = false;
                } else if command_position {
                    if is_valid_command(word, cache) {
                        result.push_str(GREEN_BOLD);
                    } else {
                        result.push_str(RED_BOLD);
                    }
                    result.push_str(word);
                    result.push_str(RESET);
                    command_position = false;
                } else {
                    result.push_str(word);
                }
            }
        }
    }

    result
}

/// `pos` の位置の 1 文字（UTF-8 マルチバイト対応）を `result` に写す。
fn push_char(result: &mut String, buf: &str, pos: &mut usize) {
    let rest = &buf[*pos..];
    match rest.chars().next() {
        Some(ch) => {
            result.push(ch);
            *pos += ch.len_utf8();
        }
        None => *pos += 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_cache() -> PathCache {
        PathCache::with_commands(&[])
    }

    fn cache_with(names: &[&str]) -> PathCache {
        PathCache::with_commands(names)
    }

    #[test]
    fn builtin_is_green() {
        let out = highlight("echo", &empty_cache());
        assert!(out.contains(GREEN_BOLD));
        assert!(out.contains("echo"));
    }

    #[test]
    fn path_command_is_green() {
        let out = highlight("mytool", &cache_with(&["mytool"]));
        assert!(out.contains(&format!("{}mytool{}", GREEN_BOLD, RESET)));
    }

    #[test]
    fn unknown_command_is_red() {
        let out = highlight("nosuchcmd", &empty_cache());
        assert!(out.contains(RED_BOLD));
    }

    #[test]
    fn pipe_is_cyan_and_resets_command_position() {
        let out = highlight("echo hi | exit", &empty_cache());
        assert!(out.contains(&format!("{}|{}", CYAN, RESET)));
        assert!(out.contains(&format!("{}exit{}", GREEN_BOLD, RESET)));
    }

    #[test]
    fn redirect_operators_are_cyan() {
        for op in [">", ">>", "1>", "1>>", "2>", "2>>"] {
            let line = format!("echo hi {} out.txt", op);
            let out = highlight(&line, &empty_cache());
            assert!(
                out.contains(&format!("{}{}{}", CYAN, op, RESET)),
                "operator {} should be cyan in {:?}",
                op,
                out,
            );
        }
    }

    #[test]
    fn redirect_target_is_plain() {
        let out = highlight("echo > out.txt", &empty_cache());
        // ターゲットには色を付けない
        assert!(out.contains("out.txt"));
        assert!(!out.contains(&format!("{}out.txt", YELLOW)));
        assert!(!out.contains(&format!("{}out.txt", GREEN_BOLD)));
    }

    #[test]
    fn quoted_region_is_yellow() {
        let out = highlight("echo \"hello world\"", &empty_cache());
        assert!(out.contains(YELLOW));
        let out = highlight("echo 'a b'", &empty_cache());
        assert!(out.contains(YELLOW));
    }

    #[test]
    fn escaped_quote_in_double_does_not_close() {
        let out = highlight(r#"echo "a\"b""#, &empty_cache());
        // \" の後の b までがクォート領域に入る
        let yellow_start = out.find(YELLOW).unwrap();
        let reset_after = out[yellow_start..].find(RESET).unwrap();
        assert!(out[yellow_start..yellow_start + reset_after].contains("b"));
    }

    #[test]
    fn visible_text_is_preserved() {
        let input = "echo 'x y' | wc -c > out";
        let out = highlight(input, &empty_cache());
        let stripped: String = {
            // ANSI シーケンスを取り除いて元の文字列と比較
            let mut s = String::new();
            let mut rest = out.as_str();
            while let Some(start) = rest.find('\x1b') {
                s.push_str(&rest[..start]);
                match rest[start..].find('m') {
                    Some(end) => rest = &rest[start + end + 1..],
                    None => break,
                }
            }
            s.push_str(rest);
            s
        };
        assert_eq!(stripped, input);
    }

    #[test]
    fn prefix_lookup_is_sorted() {
        let cache = cache_with(&["grep", "git", "gzip", "cat"]);
        assert_eq!(cache.commands_with_prefix("g"), vec!["git", "grep", "gzip"]);
        assert!(cache.commands_with_prefix("zz").is_empty());
    }
}
