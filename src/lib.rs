pub mod analysis;
pub mod domain;
pub mod downloader;
pub mod error;
pub mod fetch;
pub mod loading;
pub mod networking;
pub mod output;
pub mod phonology;
pub mod records;
pub mod remote;
pub mod settings;
pub mod versioning;
