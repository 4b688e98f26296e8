pub mod connection;

pub use connection::{connect_to_browser, find_page_by_url};
