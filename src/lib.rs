//! whelk ライブラリ — ベンチマーク・テスト用にモジュールを公開する。
//!
//! バイナリ本体は `main.rs` の REPL ループ。この `lib.rs` は
//! `benches/bench_main.rs` 等の外部クレートからパーサー・ビルトイン・
//! 実行エンジンに直接アクセスするために存在する。
//!
//! ## モジュール構成
//!
//! | モジュール | 役割 |
//! |-----------|------|
//! | [`parser`] | 構文解析（クォート、エスケープ、パイプ分割、リダイレクト抽出） |
//! | [`resolve`] | `$PATH` 探索（プログラム名 → 実行可能ファイルの絶対パス） |
//! | [`builtins`] | ビルトイン（`exit`, `echo`, `type`, `pwd`, `cd`, `history`） |
//! | [`redirect`] | リダイレクトの適用と復元（親: RAII ガード、子: 適用のみ） |
//! | [`executor`] | コマンド実行（fork、パイプ接続、リダイレクト、wait） |
//! | [`complete`] | Tab 補完（先頭ワードのコマンド名のみ） |
//! | [`highlight`] | シンタックスハイライト（ANSI カラー、PATH キャッシュ） |
//! | [`history`] | セッション履歴（固定インデックス、`-r`/`-w`/`-a`、↑↓） |
//! | [`editor`] | 行エディタ（raw モード、キー入力、表示更新、非 tty フォールバック） |
//! | [`shell`] | シェルのグローバル状態（終了フラグ、履歴バッファ） |

pub mod builtins;
pub mod complete;
pub mod editor;
pub mod executor;
pub mod highlight;
pub mod history;
pub mod parser;
pub mod redirect;
pub mod resolve;
pub mod shell;
