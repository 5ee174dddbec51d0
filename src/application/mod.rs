//! Application services: command parsing, dispatch and the ports they use.

pub mod commands;
pub mod dispatcher;
pub mod error;
pub mod messenger;
pub mod replies;
pub mod repos;
