pub mod decision;
pub mod mailer;

pub use decision::{DecisionNotice, DecisionNotifier};
pub use mailer::{Attachment, HttpMailer, LogMailer, MailError, Mailer, OutboundEmail};
