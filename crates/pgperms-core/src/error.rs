//! Error types for the diff-and-plan engine.

use pgperms_access::AccessError;

/// A desired-state document failed validation. Carries every violation
/// found, not just the first, matching the "report with all messages
/// concatenated" requirement for configuration errors.
#[derive(Debug, thiserror::Error)]
#[error("{}", render(.0))]
pub struct ValidationError(pub Vec<String>);

fn render(messages: &[String]) -> String {
    match messages {
        [] => "Config is invalid".to_owned(),
        [only] => format!("Config is invalid: {only}"),
        many => {
            let mut out = String::from("Config is invalid:\n");
            for m in many {
                out.push_str("* ");
                out.push_str(m);
                out.push('\n');
            }
            out.pop();
            out
        }
    }
}

/// Top-level error type for `gather`/`sync`/`dump`.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("failed to parse desired-state document: {0}")]
    Parse(#[from] serde_yaml::Error),
}
