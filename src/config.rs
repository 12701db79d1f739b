/// Server configuration, parsed from argv (§4.L).
///
/// Hand-rolled rather than via a CLI-argument crate: the surface is two
/// optional flags, both with sane defaults, so a parser dependency would
/// outweigh what it saves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Chunk size used when reading PTY output, in bytes.
    pub chunk_size: usize,
    /// Soft cap on concurrent sessions. `None` means unbounded. Exceeding it
    /// logs a warning but never refuses a `create` command (§4.L).
    pub max_sessions: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: crate::core::reader::PTY_CHUNK_SIZE,
            max_sessions: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{flag} requires a value")]
    MissingValue { flag: String },
    #[error("{flag} value {value:?} is not a valid number")]
    InvalidNumber { flag: String, value: String },
    #[error("unrecognized argument: {0}")]
    Unrecognized(String),
}

impl Config {
    /// Parses `--chunk-size <bytes>` and `--max-sessions <n>` out of `args`
    /// (typically `std::env::args().skip(1)`). Unknown flags are a hard
    /// parse error rather than silently ignored, so a typo on the command
    /// line surfaces immediately instead of as confusing runtime behavior.
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        let mut iter = args.into_iter();

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--chunk-size" => {
                    let value = iter.next().ok_or_else(|| ConfigError::MissingValue {
                        flag: "--chunk-size".to_string(),
                    })?;
                    config.chunk_size =
                        value
                            .parse()
                            .map_err(|_| ConfigError::InvalidNumber {
                                flag: "--chunk-size".to_string(),
                                value,
                            })?;
                }
                "--max-sessions" => {
                    let value = iter.next().ok_or_else(|| ConfigError::MissingValue {
                        flag: "--max-sessions".to_string(),
                    })?;
                    let parsed: usize =
                        value
                            .parse()
                            .map_err(|_| ConfigError::InvalidNumber {
                                flag: "--max-sessions".to_string(),
                                value,
                            })?;
                    config.max_sessions = Some(parsed);
                }
                other => return Err(ConfigError::Unrecognized(other.to_string())),
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = Config::default();
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.max_sessions, None);
    }

    #[test]
    fn parses_both_flags() {
        let config = Config::parse(
            ["--chunk-size", "2048", "--max-sessions", "16"]
                .into_iter()
                .map(String::from),
        )
        .unwrap();
        assert_eq!(config.chunk_size, 2048);
        assert_eq!(config.max_sessions, Some(16));
    }

    #[test]
    fn unrecognized_flag_is_an_error() {
        let result = Config::parse(["--bogus"].into_iter().map(String::from));
        assert!(matches!(result, Err(ConfigError::Unrecognized(_))));
    }

    #[test]
    fn missing_value_is_an_error() {
        let result = Config::parse(["--chunk-size"].into_iter().map(String::from));
        assert!(matches!(result, Err(ConfigError::MissingValue { .. })));
    }
}
