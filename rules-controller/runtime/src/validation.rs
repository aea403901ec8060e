use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

const RULES_FILE_NAME_REGEX: &str = r"\A[-._a-zA-Z0-9]+\z";

static RULES_FILE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(RULES_FILE_NAME_REGEX).expect("should compile"));

#[derive(Debug, Error, PartialEq, Eq)]
#[error("rules file name {0:?} must match the regex: {regex}", regex = RULES_FILE_NAME_REGEX)]
pub(crate) struct InvalidFileName(String);

/// Accepts names usable both as a file name and as a ConfigMap key.
pub(crate) fn parse_rules_file_name(name: &str) -> Result<String, InvalidFileName> {
    if RULES_FILE_NAME.is_match(name) {
        Ok(name.to_string())
    } else {
        Err(InvalidFileName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_file_names() {
        for name in ["access-rules.json", "rules_v2.json", "RULES", ".hidden", "a-b.c_d"] {
            assert_eq!(parse_rules_file_name(name), Ok(name.to_string()), "{name}");
        }
    }

    #[test]
    fn file_name_regex_compiles() {
        assert_eq!(RULES_FILE_NAME.as_str(), RULES_FILE_NAME_REGEX);
    }

    #[test]
    fn rejects_paths_and_blanks() {
        for name in ["", "rules/x.json", "../rules.json", "rules json", "rules.json\n", "ünïcode"] {
            assert_eq!(
                parse_rules_file_name(name),
                Err(InvalidFileName(name.to_string())),
                "{name:?}"
            );
        }
    }
}
