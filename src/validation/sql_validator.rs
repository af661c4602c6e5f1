use sqlparser::dialect::MySqlDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Tokenizer};

use crate::error::ExplorerError;

/// Broad category of a statement, used to decide cache invalidation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Reads only (SELECT, SHOW, DESCRIBE, EXPLAIN)
    Read,
    /// Changes rows (INSERT, UPDATE, DELETE, REPLACE, TRUNCATE)
    Write,
    /// Changes the object hierarchy (CREATE, DROP, ALTER, RENAME)
    Structural,
    Other,
}

/// SQL text helpers for statements issued by the explorer
pub struct SqlValidator;

impl SqlValidator {
    /// MySQL limits schema object names to 64 characters
    const MAX_IDENTIFIER_LEN: usize = 64;

    /// Validate a user-supplied schema object name
    pub fn validate_identifier(name: &str) -> Result<&str, ExplorerError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ExplorerError::Validation("Name must not be empty".to_string()));
        }
        if trimmed.chars().count() > Self::MAX_IDENTIFIER_LEN {
            return Err(ExplorerError::Validation(format!(
                "Name exceeds {} characters: {}",
                Self::MAX_IDENTIFIER_LEN,
                trimmed
            )));
        }
        if trimmed.contains('\0') {
            return Err(ExplorerError::Validation("Name must not contain NUL".to_string()));
        }
        Ok(trimmed)
    }

    /// Backtick-quote an identifier, doubling embedded backticks
    pub fn quote_identifier(name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    /// `schema`.`object`
    pub fn qualified_name(schema: &str, object: &str) -> String {
        format!("{}.{}", Self::quote_identifier(schema), Self::quote_identifier(object))
    }

    /// Single-quote a string literal, escaping backslashes and quotes
    pub fn quote_literal(value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
    }

    /// Classify a statement by its leading keyword
    pub fn classify(sql: &str) -> StatementKind {
        let dialect = MySqlDialect {};
        let tokens = match Tokenizer::new(&dialect, sql).tokenize() {
            Ok(tokens) => tokens,
            Err(_) => return StatementKind::Other,
        };

        let leading = tokens.iter().find_map(|token| match token {
            Token::Whitespace(_) => None,
            Token::Word(word) => Some(word.keyword),
            _ => Some(Keyword::NoKeyword),
        });

        match leading {
            Some(Keyword::CREATE | Keyword::DROP | Keyword::ALTER | Keyword::RENAME) => {
                StatementKind::Structural
            }
            Some(
                Keyword::INSERT
                | Keyword::UPDATE
                | Keyword::DELETE
                | Keyword::REPLACE
                | Keyword::TRUNCATE,
            ) => StatementKind::Write,
            Some(
                Keyword::SELECT
                | Keyword::SHOW
                | Keyword::WITH
                | Keyword::DESCRIBE
                | Keyword::DESC
                | Keyword::EXPLAIN,
            ) => StatementKind::Read,
            _ => StatementKind::Other,
        }
    }

    pub fn is_structural(sql: &str) -> bool {
        Self::classify(sql) == StatementKind::Structural
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert_eq!(SqlValidator::validate_identifier("  app_db ").unwrap(), "app_db");
        assert!(SqlValidator::validate_identifier("").is_err());
        assert!(SqlValidator::validate_identifier("   ").is_err());
        assert!(SqlValidator::validate_identifier(&"x".repeat(65)).is_err());
        assert!(SqlValidator::validate_identifier(&"x".repeat(64)).is_ok());
    }

    #[test]
    fn test_quoting() {
        assert_eq!(SqlValidator::quote_identifier("app_db"), "`app_db`");
        assert_eq!(SqlValidator::quote_identifier("we`ird"), "`we``ird`");
        assert_eq!(SqlValidator::qualified_name("db", "t"), "`db`.`t`");
        assert_eq!(SqlValidator::quote_literal("it's"), "'it''s'");
        assert_eq!(SqlValidator::quote_literal("a\\b"), "'a\\\\b'");
    }

    #[test]
    fn test_classify() {
        assert_eq!(SqlValidator::classify("SELECT 1"), StatementKind::Read);
        assert_eq!(SqlValidator::classify("  show databases"), StatementKind::Read);
        assert_eq!(SqlValidator::classify("CREATE TABLE t (id int)"), StatementKind::Structural);
        assert_eq!(SqlValidator::classify("drop database x"), StatementKind::Structural);
        assert_eq!(SqlValidator::classify("ALTER TABLE t ADD c int"), StatementKind::Structural);
        assert_eq!(SqlValidator::classify("INSERT INTO t VALUES (1)"), StatementKind::Write);
        assert_eq!(SqlValidator::classify("TRUNCATE TABLE t"), StatementKind::Write);
        assert_eq!(SqlValidator::classify("SET NAMES utf8"), StatementKind::Other);
        assert!(SqlValidator::is_structural("-- note\nCREATE DATABASE x"));
        assert!(!SqlValidator::is_structural("SELECT 'CREATE'"));
    }
}
