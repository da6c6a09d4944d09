pub mod command;
pub mod reply;
pub mod server;
pub mod session;

pub use command::Verb;
pub use reply::Reply;
pub use server::Server;
pub use session::{Event, Session, State};
