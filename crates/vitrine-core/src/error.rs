use std::fmt;

/// Machine-readable error codes surfaced by the HTTP API and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    CatalogUnavailable,
    ConfigInvalid,
    EmptyQuery,
    InvalidTopK,
    InvalidImage,
    CatalogQueryFailed,
    VectorIndexUnavailable,
    LexicalIndexUnavailable,
    EmbeddingFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::CatalogUnavailable => "E1001",
            Self::ConfigInvalid => "E1002",
            Self::EmptyQuery => "E2001",
            Self::InvalidTopK => "E2002",
            Self::InvalidImage => "E2003",
            Self::CatalogQueryFailed => "E3001",
            Self::VectorIndexUnavailable => "E6001",
            Self::LexicalIndexUnavailable => "E6002",
            Self::EmbeddingFailed => "E6003",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::CatalogUnavailable => "Catalog database unavailable",
            Self::ConfigInvalid => "Invalid configuration",
            Self::EmptyQuery => "No query content provided",
            Self::InvalidTopK => "Invalid result count",
            Self::InvalidImage => "Invalid or corrupt image",
            Self::CatalogQueryFailed => "Catalog lookup failed",
            Self::VectorIndexUnavailable => "Vector index unavailable",
            Self::LexicalIndexUnavailable => "Lexical index unavailable",
            Self::EmbeddingFailed => "Query embedding failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and clients.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::CatalogUnavailable => Some("Run `vt init` and `vt import` to create the catalog."),
            Self::ConfigInvalid => Some("Fix the syntax or values in vitrine.toml and retry."),
            Self::EmptyQuery => Some("Provide a text query, an image, or both."),
            Self::InvalidTopK => Some("Use a positive integer for top_k."),
            Self::InvalidImage => Some("Upload a PNG, JPEG or WebP image."),
            Self::CatalogQueryFailed | Self::VectorIndexUnavailable => {
                Some("Check the catalog database; results may be partial.")
            }
            Self::LexicalIndexUnavailable => Some("Run `vt index` to rebuild the lexical index."),
            Self::EmbeddingFailed => Some("Verify the embedding service is reachable."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl ErrorCode {
    /// `E####: message (hint: ..)` line for terminals and logs.
    #[must_use]
    pub fn summary(self) -> String {
        match self.hint() {
            Some(hint) => format!("{}: {} (hint: {hint})", self.code(), self.message()),
            None => format!("{}: {}", self.code(), self.message()),
        }
    }

    /// Tag `err` with this code as its outermost context.
    #[must_use]
    pub fn wrap(self, err: anyhow::Error) -> anyhow::Error {
        err.context(self.summary())
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorCode;
    use std::collections::HashSet;

    const ALL: [ErrorCode; 10] = [
        ErrorCode::CatalogUnavailable,
        ErrorCode::ConfigInvalid,
        ErrorCode::EmptyQuery,
        ErrorCode::InvalidTopK,
        ErrorCode::InvalidImage,
        ErrorCode::CatalogQueryFailed,
        ErrorCode::VectorIndexUnavailable,
        ErrorCode::LexicalIndexUnavailable,
        ErrorCode::EmbeddingFailed,
        ErrorCode::InternalUnexpected,
    ];

    #[test]
    fn all_codes_are_unique() {
        let mut seen = HashSet::new();
        for code in ALL {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        for code in ALL {
            let code = code.code();
            assert_eq!(code.len(), 5);
            assert!(code.starts_with('E'));
            assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn wrap_puts_code_first_and_keeps_cause() {
        let err = ErrorCode::CatalogUnavailable.wrap(anyhow::anyhow!("disk full"));
        let rendered = format!("{err:#}");
        assert!(rendered.starts_with("E1001: Catalog database unavailable"), "{rendered}");
        assert!(rendered.contains("hint: Run `vt init`"), "{rendered}");
        assert!(rendered.ends_with("disk full"), "{rendered}");
    }

    #[test]
    fn client_codes_live_in_e2_range() {
        for code in [
            ErrorCode::EmptyQuery,
            ErrorCode::InvalidTopK,
            ErrorCode::InvalidImage,
        ] {
            assert!(code.code().starts_with("E2"), "{code:?}");
        }
    }
}
