//! `$PATH` 探索: プログラム名から実行可能ファイルの絶対パスを引く。
//!
//! `$PATH` をコロンで分割し、先頭から順に `dir/name` を調べて
//! 最初に見つかった実行可能な通常ファイルを返す。
//! 判定はオーナー実行ビット（`0o100`）のみを見る。
//! 補完・ハイライトが使う [`PathCache`](crate::highlight::PathCache) は
//! 全クラスの実行ビット（`0o111`）を見る別述語であり、混同しないこと。

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// 現在の `$PATH` から `name` を探す。
///
/// `$PATH` 未設定・どのエントリにも見つからない場合は `None`。
pub fn resolve(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var("PATH").ok()?;
    resolve_in(name, &path_var)
}

/// 明示された探索パス文字列から `name` を探す。
///
/// 空のディレクトリエントリ（`::` の間など）はスキップする。
/// 環境に触れないのでテスト・ベンチマークからはこちらを使う。
pub fn resolve_in(name: &str, path_var: &str) -> Option<PathBuf> {
    for dir in path_var.split(':') {
        if dir.is_empty() {
            continue;
        }
        let candidate = Path::new(dir).join(name);
        if is_owner_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// 通常ファイルかつオーナー実行ビットが立っているか。
fn is_owner_executable(path: &Path) -> bool {
    match path.metadata() {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o100 != 0,
        Err(_) => false,
    }
}
