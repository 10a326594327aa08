//! expviz: poll a process's published `/debug/vars` document and fan each
//! snapshot out to any number of WebSocket viewers, replaying recent history
//! to viewers that join late.

pub mod cli;
pub mod decode;
pub mod hub;
pub mod poller;
pub mod server;
pub mod source;
pub mod state;
pub mod types;
pub mod ws;
