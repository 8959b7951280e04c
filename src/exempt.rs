//! Static exemption rules.
//!
//! Paths matching these rules are never checked: customization areas,
//! generated artifacts and files third parties drop into the web root.

use regex::Regex;

#[derive(Debug)]
enum Matcher {
    Exact(&'static str),
    /// Strict prefix: the path must be longer than the prefix.
    Prefix(String),
    Pattern(Regex),
}

#[derive(Debug)]
struct Rule {
    name: &'static str,
    matcher: Matcher,
}

impl Rule {
    fn matches(&self, path: &str) -> bool {
        match &self.matcher {
            Matcher::Exact(name) => path == *name,
            Matcher::Prefix(prefix) => path.len() > prefix.len() && path.starts_with(prefix),
            Matcher::Pattern(regex) => regex.is_match(path),
        }
    }
}

/// Decides whether a relative path is exempt from integrity checking.
///
/// Rules are compiled once at construction and evaluated in order; the
/// first match wins.
#[derive(Debug)]
pub struct PathClassifier {
    rules: Vec<Rule>,
}

impl PathClassifier {
    /// Builds the rule set for an installation whose manifest names its
    /// customization directory `content_dir_name`.
    pub fn new(content_dir_name: &str) -> Result<Self, regex::Error> {
        let pattern = |name, re: &str| -> Result<Rule, regex::Error> {
            Ok(Rule {
                name,
                matcher: Matcher::Pattern(Regex::new(re)?),
            })
        };
        let prefix = |name, p: String| Rule {
            name,
            matcher: Matcher::Prefix(p),
        };

        let rules = vec![
            Rule {
                name: "own config",
                matcher: Matcher::Exact(crate::config::CONFIG_FILE_NAME),
            },
            pattern("self backup", r"^coreward-[0-9a-z\-]+\.php$")?,
            pattern(
                "database dump",
                r"^\S+-coreward-db-dump-gzip-[0-9]{10}-[0-9a-z]{32}\.gz$",
            )?,
            pattern(
                "top level static asset",
                r"^([^/]*)\.(pdf|css|txt|jpg|gif|png|jpeg)$",
            )?,
            prefix("themes", format!("{content_dir_name}/themes/")),
            prefix("plugins", format!("{content_dir_name}/plugins/")),
            pattern("site verification", r"^google[0-9a-z]{16}\.html$")?,
            pattern("site verification", r"^pinterest-[0-9a-z]{5}\.html$")?,
            pattern("favicon", r"\.ico$")?,
        ];

        Ok(PathClassifier { rules })
    }

    pub fn is_exempt(&self, relative_path: &str) -> bool {
        self.matching_rule(relative_path).is_some()
    }

    /// Name of the first rule matching `relative_path`.
    pub fn matching_rule(&self, relative_path: &str) -> Option<&'static str> {
        self.rules
            .iter()
            .find(|rule| rule.matches(relative_path))
            .map(|rule| rule.name)
    }
}
