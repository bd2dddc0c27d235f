//! トークナイザ + パーサー: 入力行からパイプライン AST を構築する。
//!
//! 処理は 2 段階に分かれる:
//!
//! 1. **パイプ分割** ([`split_pipes`]): クォート状態機械 [`QuoteState`] を使い、
//!    クォート外の `|` で行をセグメントに分割する。
//! 2. **セグメントごとのトークン化 + リダイレクト抽出** ([`tokenize`] → [`parse`]):
//!    各セグメントをワード列に変換し、ワード列を左から走査して
//!    リダイレクト演算子（`>`, `1>`, `>>`, `1>>`, `2>`, `2>>`）と
//!    後続のターゲットワードを [`Redirect`] として取り出す。
//!
//! ## クォート規則
//!
//! | コンテキスト | `'` | `"` | `\x` |
//! |------------|-----|-----|------|
//! | bare | single へ | double へ | `x` をリテラル出力 |
//! | single | bare へ | リテラル | リテラル（エスケープなし） |
//! | double | リテラル | bare へ | `x ∈ {", \}` なら `x`、それ以外は `\x` 両方 |
//!
//! 末尾に孤立した `\` が残った場合は `\` そのものを出力する。
//!
//! トークナイザは `|` や `>` を演算子として認識しない。演算子の認識は
//! トークン化後のワード列に対する完全一致で行う（部分一致は不可）。
//! 唯一の例外はパイプ分割で、これはトークン化に先立って生の行を再走査する。
//!
//! ## ゼロコピー
//!
//! クォートもエスケープも含まないワードは入力行のスライスを
//! [`Cow::Borrowed`] でそのまま返す。書き換えが発生したワードのみ
//! `Owned` になる。

use std::borrow::Cow;
use std::fmt;

// ── AST ─────────────────────────────────────────────────────────────

/// パイプラインで接続されたコマンド列。`cmd1 | cmd2 | cmd3` → 3要素。
#[derive(Debug, PartialEq)]
pub struct Pipeline<'a> {
    pub commands: Vec<Command<'a>>,
}

/// 単一コマンド。ワード列(`words[0]` がプログラム名)と
/// fd ごとのリダイレクト指定（stdout = fd 1, stderr = fd 2）を持つ。
///
/// 同一 fd への複数指定は最後のものだけが残る。
#[derive(Debug, PartialEq)]
pub struct Command<'a> {
    pub words: Vec<Cow<'a, str>>,
    pub stdout: Option<Redirect<'a>>,
    pub stderr: Option<Redirect<'a>>,
}

/// ファイルリダイレクト指定。モードとターゲットファイルパスを持つ。
#[derive(Debug, PartialEq)]
pub struct Redirect<'a> {
    pub mode: RedirectMode,
    pub target: Cow<'a, str>,
}

/// リダイレクトのオープンモード。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    /// `>` / `1>` / `2>` — create + truncate
    Truncate,
    /// `>>` / `1>>` / `2>>` — create + append
    Append,
}

// ── Error ───────────────────────────────────────────────────────────

/// パース時に発生しうるエラー。
///
/// REPL はこれらを黙って握りつぶす（出力なしでプロンプトに戻る）が、
/// テスト・ベンチマークからは判別できるよう `Display` を実装する。
#[derive(Debug, PartialEq)]
pub enum ParseError {
    /// パイプの前後に空セグメントがある（`ls |`, `| ls`, `a | | b` 等）。
    EmptyPipelineSegment,
    /// セグメントにリダイレクトしか残らず、コマンド名がない（`> f` 等）。
    MissingCommand,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPipelineSegment => write!(f, "syntax error near unexpected token `|`"),
            Self::MissingCommand => write!(f, "syntax error: redirection without a command"),
        }
    }
}

// ── クォート状態機械 ────────────────────────────────────────────────

/// トークナイザの 3 コンテキスト。
///
/// パイプ分割（[`split_pipes`]）とハイライト
/// （[`highlight`](crate::highlight)）でも同じ機械を使う。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteState {
    Bare,
    Single,
    Double,
}

// ── パイプ分割 ──────────────────────────────────────────────────────

/// クォート状態を追跡しながら、クォート外の `|` で行を分割する。
///
/// バックスラッシュは「次の 1 バイトは現在のセグメントの一部」としてのみ
/// 扱う（エスケープの解決はトークナイザの仕事）。シングルクォート内では
/// バックスラッシュもリテラル。
pub fn split_pipes(line: &str) -> Vec<&str> {
    let bytes = line.as_bytes();
    let mut segments = Vec::new();
    let mut state = QuoteState::Bare;
    let mut seg_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match state {
            QuoteState::Bare => match bytes[i] {
                b'\\' => i += 1, // 次バイトをスキップ
                b'\'' => state = QuoteState::Single,
                b'"' => state = QuoteState::Double,
                b'|' => {
                    segments.push(&line[seg_start..i]);
                    seg_start = i + 1;
                }
                _ => {}
            },
            QuoteState::Single => {
                if bytes[i] == b'\'' {
                    state = QuoteState::Bare;
                }
            }
            QuoteState::Double => match bytes[i] {
                b'\\' => i += 1,
                b'"' => state = QuoteState::Bare,
                _ => {}
            },
        }
        i += 1;
    }

    segments.push(&line[seg_start..]);
    segments
}

// ── トークナイザ ────────────────────────────────────────────────────

/// 進行中のワードを組み立てるバッファ。
///
/// クォート・エスケープで書き換えが発生するまでは入力スライスの範囲だけを
/// 覚えておき、emit 時に `Cow::Borrowed` を返す。
struct WordBuf {
    /// 書き換え発生後のバイト列。`dirty` のときのみ有効。
    bytes: Vec<u8>,
    /// 入力行内でのワード開始位置。ワードが始まっていなければ `None`。
    start: Option<usize>,
    /// クォート・エスケープによる書き換えが発生したか。
    dirty: bool,
}

impl WordBuf {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            start: None,
            dirty: false,
        }
    }

    /// 入力位置 `pos` のバイトを素通しで追加する（borrowed 継続可能）。
    fn push_raw(&mut self, input: &[u8], pos: usize) {
        if self.dirty {
            self.bytes.push(input[pos]);
        } else if self.start.is_none() {
            self.start = Some(pos);
        }
    }

    /// 書き換えられたバイトを追加する。以後このワードは owned になる。
    fn push_rewritten(&mut self, input: &[u8], end: usize, b: u8) {
        self.make_dirty(input, end);
        self.bytes.push(b);
    }

    /// 書き換えモードに移行する。既に borrowed で溜めた範囲をコピーする。
    ///
    /// `end` は入力行内の現在位置（= borrowed 範囲の終端、排他的）。
    fn make_dirty(&mut self, input: &[u8], end: usize) {
        if !self.dirty {
            if let Some(start) = self.start {
                self.bytes.extend_from_slice(&input[start..end]);
            }
            self.dirty = true;
        }
    }

    /// 溜めたワードを取り出してバッファをリセットする。空なら `None`。
    ///
    /// `end` は入力行内の現在位置（borrowed スライスの終端）。
    fn take<'a>(&mut self, input: &'a str, end: usize) -> Option<Cow<'a, str>> {
        let word = if self.dirty {
            if self.bytes.is_empty() {
                None
            } else {
                Some(Cow::Owned(String::from_utf8_lossy(&self.bytes).into_owned()))
            }
        } else {
            self.start.map(|start| Cow::Borrowed(&input[start..end]))
        };
        self.bytes.clear();
        self.start = None;
        self.dirty = false;
        word
    }
}

/// 入力をクォート規則に従ってワード列に分解する。
///
/// 空白（スペース/タブ）は bare コンテキストでのみ区切りとなる。
/// 空ワードは emit されない（`''` は引数を生まない）。
/// 閉じられていないクォートは許容され、そこまでの内容がワードになる。
pub fn tokenize(input: &str) -> Vec<Cow<'_, str>> {
    let bytes = input.as_bytes();
    let len = bytes.len();
    let mut words = Vec::new();
    let mut buf = WordBuf::new();
    let mut state = QuoteState::Bare;
    let mut pos = 0;

    while pos < len {
        let b = bytes[pos];
        match state {
            QuoteState::Bare => match b {
                b' ' | b'\t' => {
                    if let Some(word) = buf.take(input, pos) {
                        words.push(word);
                    }
                }
                b'\'' => {
                    buf.make_dirty(bytes, pos);
                    state = QuoteState::Single;
                }
                b'"' => {
                    buf.make_dirty(bytes, pos);
                    state = QuoteState::Double;
                }
                b'\\' => {
                    if pos + 1 < len {
                        pos += 1;
                        buf.push_rewritten(bytes, pos - 1, bytes[pos]);
                    } else {
                        // 末尾の孤立バックスラッシュはそのまま出力
                        buf.push_rewritten(bytes, pos, b'\\');
                    }
                }
                _ => buf.push_raw(bytes, pos),
            },
            QuoteState::Single => match b {
                b'\'' => state = QuoteState::Bare,
                _ => buf.push_rewritten(bytes, pos, b),
            },
            QuoteState::Double => match b {
                b'"' => state = QuoteState::Bare,
                b'\\' => {
                    if pos + 1 < len {
                        match bytes[pos + 1] {
                            // \" と \\ のみエスケープとして解決
                            b'"' | b'\\' => {
                                pos += 1;
                                buf.push_rewritten(bytes, pos - 1, bytes[pos]);
                            }
                            // それ以外はバックスラッシュごと残す
                            _ => buf.push_rewritten(bytes, pos, b'\\'),
                        }
                    } else {
                        buf.push_rewritten(bytes, pos, b'\\');
                    }
                }
                _ => buf.push_rewritten(bytes, pos, b),
            },
        }
        pos += 1;
    }

    if let Some(word) = buf.take(input, len) {
        words.push(word);
    }

    words
}

// ── リダイレクト抽出 + パース ───────────────────────────────────────

/// ワードがリダイレクト演算子に完全一致すれば `(fd, mode)` を返す。
fn redirect_op(word: &str) -> Option<(i32, RedirectMode)> {
    match word {
        ">" | "1>" => Some((1, RedirectMode::Truncate)),
        ">>" | "1>>" => Some((1, RedirectMode::Append)),
        "2>" => Some((2, RedirectMode::Truncate)),
        "2>>" => Some((2, RedirectMode::Append)),
        _ => None,
    }
}

/// ワード列からリダイレクトを取り出して [`Command`] を組み立てる。
///
/// - 演算子 + 後続ワードをペアで消費する（演算子は `words` に残らない）
/// - 同一 fd への複数指定は最後のものが有効
/// - 後続ワードのない演算子は黙って捨てる
/// - 残ったワードが空ならエラー（空コマンドは不正）
fn extract_redirects(words: Vec<Cow<'_, str>>) -> Result<Command<'_>, ParseError> {
    let mut kept = Vec::with_capacity(words.len());
    let mut stdout = None;
    let mut stderr = None;

    let mut iter = words.into_iter();
    while let Some(word) = iter.next() {
        match redirect_op(&word) {
            Some((fd, mode)) => match iter.next() {
                Some(target) => {
                    let redirect = Redirect { mode, target };
                    if fd == 1 {
                        stdout = Some(redirect);
                    } else {
                        stderr = Some(redirect);
                    }
                }
                None => {} // ターゲットなしの演算子は無視
            },
            None => kept.push(word),
        }
    }

    if kept.is_empty() {
        return Err(ParseError::MissingCommand);
    }

    Ok(Command {
        words: kept,
        stdout,
        stderr,
    })
}

/// 入力行をパースして `Pipeline` AST を返す。
///
/// - 空入力（空白のみ、またはワードを生まない入力） → `Ok(None)`
/// - 正常なコマンド → `Ok(Some(Pipeline))`
/// - 構文エラー → `Err(ParseError)`
pub fn parse(line: &str) -> Result<Option<Pipeline<'_>>, ParseError> {
    let segments = split_pipes(line);
    let multi = segments.len() > 1;
    let mut commands = Vec::with_capacity(segments.len());

    for segment in segments {
        let words = tokenize(segment);
        if words.is_empty() {
            if multi {
                return Err(ParseError::EmptyPipelineSegment);
            }
            return Ok(None);
        }
        commands.push(extract_redirects(words)?);
    }

    Ok(Some(Pipeline { commands }))
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// トークン列を String ベクタとして取り出す。
    fn words(input: &str) -> Vec<String> {
        tokenize(input).iter().map(|w| w.to_string()).collect()
    }

    /// パース結果から各コマンドのワードを文字列ベクタとして取り出す。
    fn parse_words(input: &str) -> Vec<Vec<String>> {
        let pipeline = parse(input).unwrap().unwrap();
        pipeline
            .commands
            .iter()
            .map(|cmd| cmd.words.iter().map(|w| w.to_string()).collect())
            .collect()
    }

    // ── ワード分割 ──

    #[test]
    fn simple_words() {
        assert_eq!(words("echo hello world"), vec!["echo", "hello", "world"]);
    }

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(words("  echo \t hello  "), vec!["echo", "hello"]);
    }

    #[test]
    fn empty_and_blank_input() {
        assert!(words("").is_empty());
        assert!(words("   \t ").is_empty());
    }

    // ── シングルクォート ──

    #[test]
    fn single_quotes_preserve_spaces() {
        assert_eq!(words("echo 'hello   world'"), vec!["echo", "hello   world"]);
    }

    #[test]
    fn single_quotes_no_escape() {
        // シングルクォート内の \ と " はリテラル
        assert_eq!(words(r#"echo 'a\b"c'"#), vec!["echo", r#"a\b"c"#]);
    }

    #[test]
    fn adjacent_quoted_parts_join() {
        assert_eq!(words("echo 'ab''cd'"), vec!["echo", "abcd"]);
    }

    #[test]
    fn empty_quotes_emit_no_word() {
        // ワードは非空のときのみ emit される
        assert_eq!(words("echo ''"), vec!["echo"]);
        assert_eq!(words("echo \"\" x"), vec!["echo", "x"]);
    }

    // ── ダブルクォート ──

    #[test]
    fn double_quotes_preserve_spaces() {
        assert_eq!(words("echo \"hello   world\""), vec!["echo", "hello   world"]);
    }

    #[test]
    fn double_quote_escapes_quote_and_backslash() {
        assert_eq!(words(r#"echo "a\"b""#), vec!["echo", r#"a"b"#]);
        assert_eq!(words(r#"echo "a\\b""#), vec!["echo", r"a\b"]);
    }

    #[test]
    fn double_quote_keeps_other_escapes() {
        // \n はエスケープではない: バックスラッシュごと残る
        assert_eq!(words(r#"echo "a\nb""#), vec!["echo", r"a\nb"]);
    }

    #[test]
    fn single_quote_inside_double_is_literal() {
        assert_eq!(words(r#"echo "it's""#), vec!["echo", "it's"]);
    }

    // ── bare エスケープ ──

    #[test]
    fn bare_escape_space() {
        assert_eq!(words(r"echo a\ b"), vec!["echo", "a b"]);
    }

    #[test]
    fn bare_escape_quotes() {
        assert_eq!(words(r#"echo \'a\'"#), vec!["echo", "'a'"]);
        assert_eq!(words(r#"echo \"a\""#), vec!["echo", "\"a\""]);
    }

    #[test]
    fn bare_escape_operator_bytes() {
        assert_eq!(words(r"echo \> \|"), vec!["echo", ">", "|"]);
    }

    #[test]
    fn trailing_backslash_is_literal() {
        assert_eq!(words(r"echo a\"), vec!["echo", r"a\"]);
        assert_eq!(words("echo \"a\\"), vec!["echo", r"a\"]);
    }

    #[test]
    fn unterminated_quote_emits_word() {
        assert_eq!(words("echo 'abc"), vec!["echo", "abc"]);
        assert_eq!(words("echo \"abc"), vec!["echo", "abc"]);
    }

    #[test]
    fn mixed_quoting_scenario() {
        assert_eq!(
            words(r#"echo "hello   world" 'a'\ b"#),
            vec!["echo", "hello   world", "a b"],
        );
    }

    // ── ゼロコピー ──

    #[test]
    fn plain_words_are_borrowed() {
        for word in tokenize("echo hello world") {
            assert!(matches!(word, Cow::Borrowed(_)), "expected Borrowed");
        }
    }

    #[test]
    fn quoted_words_are_owned() {
        let toks = tokenize("echo 'hello'");
        assert!(matches!(toks[0], Cow::Borrowed(_)));
        assert!(matches!(toks[1], Cow::Owned(_)));
    }

    // ── パイプ分割 ──

    #[test]
    fn split_plain_pipeline() {
        assert_eq!(split_pipes("a | b | c"), vec!["a ", " b ", " c"]);
    }

    #[test]
    fn split_ignores_quoted_pipe() {
        assert_eq!(split_pipes("echo 'a|b' | cat"), vec!["echo 'a|b' ", " cat"]);
        assert_eq!(split_pipes("echo \"a|b\""), vec!["echo \"a|b\""]);
    }

    #[test]
    fn split_ignores_escaped_pipe() {
        assert_eq!(split_pipes(r"echo a\|b"), vec![r"echo a\|b"]);
    }

    #[test]
    fn split_no_pipe() {
        assert_eq!(split_pipes("echo hello"), vec!["echo hello"]);
    }

    // ── parse: 基本 ──

    #[test]
    fn parse_simple_command() {
        assert_eq!(parse_words("echo hello"), vec![vec!["echo", "hello"]]);
    }

    #[test]
    fn parse_empty_input() {
        assert!(parse("").unwrap().is_none());
        assert!(parse("   ").unwrap().is_none());
        assert!(parse("''").unwrap().is_none());
    }

    #[test]
    fn parse_pipeline() {
        assert_eq!(
            parse_words("echo hello | wc -c"),
            vec![vec!["echo", "hello"], vec!["wc", "-c"]],
        );
    }

    #[test]
    fn parse_three_stages() {
        assert_eq!(
            parse_words("cat f | grep x | head -1"),
            vec![vec!["cat", "f"], vec!["grep", "x"], vec!["head", "-1"]],
        );
    }

    // ── parse: リダイレクト ──

    #[test]
    fn redirect_truncate() {
        let p = parse("echo hi > out.txt").unwrap().unwrap();
        let cmd = &p.commands[0];
        assert_eq!(cmd.words, vec!["echo", "hi"]);
        let r = cmd.stdout.as_ref().unwrap();
        assert_eq!(r.mode, RedirectMode::Truncate);
        assert_eq!(r.target, "out.txt");
        assert!(cmd.stderr.is_none());
    }

    #[test]
    fn redirect_fd1_explicit() {
        let p = parse("echo hi 1> out.txt").unwrap().unwrap();
        assert!(p.commands[0].stdout.is_some());
    }

    #[test]
    fn redirect_append() {
        let p = parse("echo hi >> out.txt").unwrap().unwrap();
        assert_eq!(p.commands[0].stdout.as_ref().unwrap().mode, RedirectMode::Append);
        let p = parse("echo hi 1>> out.txt").unwrap().unwrap();
        assert_eq!(p.commands[0].stdout.as_ref().unwrap().mode, RedirectMode::Append);
    }

    #[test]
    fn redirect_stderr() {
        let p = parse("ls missing 2> err.txt").unwrap().unwrap();
        let r = p.commands[0].stderr.as_ref().unwrap();
        assert_eq!(r.mode, RedirectMode::Truncate);
        assert_eq!(r.target, "err.txt");
        let p = parse("ls missing 2>> err.txt").unwrap().unwrap();
        assert_eq!(p.commands[0].stderr.as_ref().unwrap().mode, RedirectMode::Append);
    }

    #[test]
    fn redirect_both_fds() {
        let p = parse("cmd > out 2> err").unwrap().unwrap();
        let cmd = &p.commands[0];
        assert_eq!(cmd.words, vec!["cmd"]);
        assert_eq!(cmd.stdout.as_ref().unwrap().target, "out");
        assert_eq!(cmd.stderr.as_ref().unwrap().target, "err");
    }

    #[test]
    fn repeated_redirect_keeps_last() {
        let p = parse("echo hi > a > b").unwrap().unwrap();
        assert_eq!(p.commands[0].stdout.as_ref().unwrap().target, "b");
    }

    #[test]
    fn dangling_redirect_is_dropped() {
        let p = parse("echo foo >").unwrap().unwrap();
        let cmd = &p.commands[0];
        assert_eq!(cmd.words, vec!["echo", "foo"]);
        assert!(cmd.stdout.is_none());
    }

    #[test]
    fn operator_must_match_whole_word() {
        // ">x" は演算子ではなく普通のワード
        let p = parse("echo >x").unwrap().unwrap();
        assert_eq!(p.commands[0].words, vec!["echo", ">x"]);
        assert!(p.commands[0].stdout.is_none());
    }

    #[test]
    fn redirect_in_pipeline_stage() {
        let p = parse("echo hi | wc -c > out").unwrap().unwrap();
        assert!(p.commands[0].stdout.is_none());
        assert_eq!(p.commands[1].stdout.as_ref().unwrap().target, "out");
    }

    // ── parse: エラー ──

    #[test]
    fn err_empty_pipe_segment() {
        assert_eq!(parse("ls |"), Err(ParseError::EmptyPipelineSegment));
        assert_eq!(parse("| ls"), Err(ParseError::EmptyPipelineSegment));
        assert_eq!(parse("a | | b"), Err(ParseError::EmptyPipelineSegment));
    }

    #[test]
    fn err_redirect_only_segment() {
        assert_eq!(parse("> f"), Err(ParseError::MissingCommand));
    }

    // ── 決定性 ──

    #[test]
    fn tokenize_is_deterministic() {
        let input = r#"echo "a b" 'c d' e\ f > out"#;
        assert_eq!(tokenize(input), tokenize(input));
    }
}
