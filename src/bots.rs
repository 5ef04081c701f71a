use regex::RegexSet;

/// Login patterns for common automation accounts. Matched case-insensitively.
pub const DEFAULT_BOT_PATTERNS: &[&str] = &[
    r"\[bot\]$",
    r"-bot$",
    r"^bot-",
    r"_bot$",
    r"^dependabot",
    r"^renovate",
    r"^github-actions",
    r"^codecov",
    r"^sonarcloud",
    r"^snyk",
    r"^mergify",
    r"^copilot",
    r"^coderabbit",
    r"^netlify",
    r"^vercel",
    r"^gitguardian",
];

/// Classifies automated accounts by login.
///
/// Built from an explicit pattern list so callers (and tests) can swap the
/// ruleset instead of relying on a global.
#[derive(Debug, Clone)]
pub struct BotFilter {
    patterns: RegexSet,
}

impl BotFilter {
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns =
            RegexSet::new(patterns.into_iter().map(|p| format!("(?i){}", p.as_ref())))?;
        Ok(Self { patterns })
    }

    /// Default ruleset plus any caller-supplied extras.
    pub fn with_extra_patterns(extra: &[String]) -> Result<Self, regex::Error> {
        Self::new(
            DEFAULT_BOT_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .chain(extra.iter().cloned()),
        )
    }

    pub fn is_bot(&self, login: &str) -> bool {
        self.patterns.is_match(login)
    }

    /// GraphQL marks app accounts with a `Bot` typename regardless of login.
    pub fn is_bot_author(&self, login: &str, typename: Option<&str>) -> bool {
        typename == Some("Bot") || self.is_bot(login)
    }
}

impl Default for BotFilter {
    fn default() -> Self {
        Self::new(DEFAULT_BOT_PATTERNS).expect("built-in bot patterns must compile")
    }
}
