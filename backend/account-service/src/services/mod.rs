/// Business logic and adapters for external collaborators
pub mod accounts;
pub mod background;
pub mod email;
pub mod object_storage;
pub mod telemetry;
pub mod uploads;

pub use accounts::{authorize, AccountService, AccountServiceDeps, Session};
pub use background::{TaskErrorReporter, TaskExecutor};
pub use email::{MailTemplates, Mailer, OutgoingMail, SmtpMailer};
pub use object_storage::{ObjectStore, S3ObjectStore};
pub use telemetry::{Telemetry, TelemetryEvent, TelemetryQueue, TelemetrySink};
pub use uploads::{UploadError, UploadPolicy, UploadRendezvous, UploadedFile};
