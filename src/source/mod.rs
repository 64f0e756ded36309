// Initial-state sources: local files and HTTP.

pub mod file_source;
pub mod http_source;
pub mod snapshot;
pub mod traits;
