pub mod completions;
pub mod import;
pub mod index;
pub mod init;
pub mod search;
pub mod serve;
