//! Tab 補完: コマンド名の候補列挙。
//!
//! 補完はバッファ先頭のワード（= プログラム名の入力中）に対してのみ
//! 行う。候補はビルトイン一覧と `$PATH` 内の実行可能ファイル名
//! （[`PathCache`] 経由、全 PATH ディレクトリ横断で重複除去）の和集合で、
//! ソート済みで返す。
//!
//! 引数位置ではファイル名補完を含め一切候補を出さない。
//!
//! ## 候補の適用（[`editor`](crate::editor) 側で処理）
//!
//! - 候補 0 件 → ベル
//! - 候補 1 件 → 単語を置換 + 末尾にスペース
//! - 候補複数 → 共通接頭辞まで補完 + 候補一覧を表示

use crate::builtins;
use crate::highlight::PathCache;

/// Tab 補完の結果。候補リストと補完対象の単語位置を持つ。
pub struct CompletionResult {
    /// 補完候補のリスト（ソート済み・重複なし）。
    pub candidates: Vec<String>,
    /// 補完対象の単語の開始バイトオフセット（バッファ内）。
    pub word_start: usize,
    /// 補完対象の単語の終了バイトオフセット（= カーソル位置）。
    pub word_end: usize,
}

/// カーソル位置の単語に対する補完候補を返す。
pub fn complete(buf: &str, cursor: usize, cache: &PathCache) -> CompletionResult {
    let (word_start, word, is_command) = current_word(buf, cursor);

    let candidates = if is_command {
        find_commands(word, cache)
    } else {
        Vec::new() // 引数位置は補完しない
    };

    CompletionResult {
        candidates,
        word_start,
        word_end: cursor,
    }
}

/// カーソル位置の単語を抽出する。
/// 戻り値: (word_start_byte, word, カーソルが最初のワード内か)
fn current_word(buf: &str, cursor: usize) -> (usize, &str, bool) {
    let before = &buf[..cursor];
    let word_start = before
        .rfind(|c: char| c == ' ' || c == '\t')
        .map(|i| i + 1)
        .unwrap_or(0);
    let word = &buf[word_start..cursor];

    // 先頭ワードの判定: カーソルより前に（空白以外の）別ワードがない
    let is_command = buf[..word_start].trim().is_empty();

    (word_start, word, is_command)
}

/// ビルトイン + PATH コマンドから prefix に一致するものを返す。
fn find_commands(prefix: &str, cache: &PathCache) -> Vec<String> {
    let mut results: Vec<String> = builtins::BUILTINS
        .iter()
        .filter(|&&b| b.starts_with(prefix))
        .map(|&b| b.to_string())
        .collect();

    results.extend(cache.commands_with_prefix(prefix));
    results.sort();
    results.dedup();
    results
}

/// 候補群の最長共通接頭辞を返す。UTF-8 文字境界を考慮する。
///
/// 複数候補がある場合にまず共通部分まで補完するために使用する。
/// 候補が空なら空文字列を返す。
pub fn longest_common_prefix(candidates: &[String]) -> &str {
    if candidates.is_empty() {
        return "";
    }
    let first = &candidates[0];
    let mut prefix_len = first.len();
    for candidate in &candidates[1..] {
        prefix_len = first
            .bytes()
            .zip(candidate.bytes())
            .take(prefix_len)
            .take_while(|(a, b)| a == b)
            .count();
    }
    // UTF-8 境界に合わせる
    while prefix_len > 0 && !first.is_char_boundary(prefix_len) {
        prefix_len -= 1;
    }
    &first[..prefix_len]
}
