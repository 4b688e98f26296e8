pub mod download_namer;
pub mod download_watcher;
pub mod sheet_auth;
pub mod sheet_client;

pub use download_namer::DownloadNamer;
pub use download_watcher::{DownloadEntry, DownloadWatcher};
pub use sheet_auth::{ServiceAccountKey, SheetAuth};
pub use sheet_client::{extract_sheet_id, RowStore, SheetsRowStore};
