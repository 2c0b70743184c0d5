pub mod backend;
pub mod config;
pub mod context;
pub mod controller;
pub mod document;
pub mod edit;
pub mod history;
pub mod keyring;
pub mod observer;
pub mod refresh;
pub mod session;
pub mod stream_decoder;
