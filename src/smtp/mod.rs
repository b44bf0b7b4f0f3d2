//! SMTP server implementation

pub mod commands;
pub mod error;
pub mod io;
pub mod response;
pub mod server;
pub mod session;

pub use commands::Command;
pub use error::{SmtpError, SmtpLimits};
pub use io::{LineIo, SmtpIo};
pub use response::SmtpResponse;
pub use server::SmtpServer;
pub use session::{SmtpSession, SmtpState};
