//! PHI-redacting logging for the CarePoint platform
//!
//! Clinic billing logs carry protected health information in free-text
//! fields (payment notes, patient contact details, record numbers). This
//! crate routes every formatted tracing line through a regex-based redactor
//! before it is written, so PHI never lands in log storage.
//!
//! # Example
//!
//! ```no_run
//! logger_redacted::init_tracing("carepoint_server", false);
//! tracing::info!("receipt emailed to billing@clinic.org");
//! // emitted as: receipt emailed to EMAIL[...]
//! ```

pub mod redactor;
pub mod writer;

pub use redactor::{PhiRedactor, RedactionConfig};
pub use writer::RedactingMakeWriter;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber with PHI redaction.
///
/// Pretty output in development, JSON in production (`CAREPOINT_ENV`),
/// both filtered by `RUST_LOG` when set.
pub fn init_tracing(service: &str, verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("{}={},tower_http=info,sqlx=warn,hyper=info", service, level).into()
    });

    let writer = RedactingMakeWriter::new(PhiRedactor::default());

    let is_development =
        std::env::var("CAREPOINT_ENV").unwrap_or_else(|_| "development".to_string())
            == "development";

    if is_development {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(writer),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .json()
                    .with_writer(writer),
            )
            .init();
    }
}
