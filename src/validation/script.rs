use crate::error::ExplorerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Normal,
    Quoted(char),
    LineComment,
    BlockComment,
}

/// Splits script text into statements on top-level terminators.
///
/// Quotes (`'`, `"`, `` ` ``) and comments (`-- `, `#`, `/* */`) are respected, and the
/// mysql client `DELIMITER` directive switches the terminator. Executable comments
/// (`/*! ... */`) count as statement content; comment-only fragments are dropped.
pub struct ScriptSplitter<'a> {
    script: &'a str,
    pos: usize,
    line: usize,
    delimiter: String,
    current: String,
    has_content: bool,
    at_line_start: bool,
    state: LexState,
    state_line: usize,
    statements: Vec<String>,
}

impl<'a> ScriptSplitter<'a> {
    pub fn new(script: &'a str) -> Self {
        Self {
            script,
            pos: 0,
            line: 1,
            delimiter: ";".to_string(),
            current: String::new(),
            has_content: false,
            at_line_start: true,
            state: LexState::Normal,
            state_line: 1,
            statements: Vec::new(),
        }
    }

    /// Split the whole script, failing on unterminated quotes or comments
    pub fn split(script: &str) -> Result<Vec<String>, ExplorerError> {
        ScriptSplitter::new(script).run()
    }

    fn rest(&self) -> &'a str {
        &self.script[self.pos..]
    }

    fn advance(&mut self, ch: char) {
        self.current.push(ch);
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.at_line_start = true;
        } else if !ch.is_whitespace() {
            self.at_line_start = false;
        }
    }

    fn advance_str(&mut self, text: &str) {
        for ch in text.chars() {
            self.advance(ch);
        }
    }

    fn enter(&mut self, state: LexState) {
        self.state = state;
        self.state_line = self.line;
    }

    fn finish_statement(&mut self) {
        let statement = self.current.trim();
        if self.has_content && !statement.is_empty() {
            self.statements.push(statement.to_string());
        }
        self.current.clear();
        self.has_content = false;
    }

    /// `DELIMITER xx` at the start of a line, before any statement content
    fn try_delimiter_directive(&mut self) -> Result<bool, ExplorerError> {
        const DIRECTIVE: &str = "DELIMITER";
        let rest = self.rest();
        let is_directive = rest.len() > DIRECTIVE.len()
            && rest.is_char_boundary(DIRECTIVE.len())
            && rest[..DIRECTIVE.len()].eq_ignore_ascii_case(DIRECTIVE)
            && rest[DIRECTIVE.len()..].starts_with(|c: char| c == ' ' || c == '\t');
        if !is_directive {
            return Ok(false);
        }

        let line_end = rest.find('\n').unwrap_or(rest.len());
        let delimiter = rest[DIRECTIVE.len()..line_end].trim();
        if delimiter.is_empty() {
            return Err(ExplorerError::Parse {
                line: self.line,
                message: "DELIMITER directive without a delimiter".to_string(),
            });
        }

        self.delimiter = delimiter.to_string();
        self.pos += line_end;
        self.current.clear();
        self.has_content = false;
        Ok(true)
    }

    fn run(mut self) -> Result<Vec<String>, ExplorerError> {
        while let Some(ch) = self.rest().chars().next() {
            match self.state {
                LexState::Normal => {
                    if self.at_line_start && !self.has_content && self.try_delimiter_directive()? {
                        continue;
                    }

                    let rest = self.rest();
                    if rest.starts_with(self.delimiter.as_str()) {
                        self.pos += self.delimiter.len();
                        self.at_line_start = false;
                        self.finish_statement();
                    } else if rest.starts_with("/*!") {
                        self.has_content = true;
                        self.enter(LexState::BlockComment);
                        self.advance_str("/*!");
                    } else if rest.starts_with("/*") {
                        self.enter(LexState::BlockComment);
                        self.advance_str("/*");
                    } else if ch == '#' || Self::starts_line_comment(rest) {
                        self.enter(LexState::LineComment);
                        self.advance(ch);
                    } else if matches!(ch, '\'' | '"' | '`') {
                        self.has_content = true;
                        self.enter(LexState::Quoted(ch));
                        self.advance(ch);
                    } else {
                        if !ch.is_whitespace() {
                            self.has_content = true;
                        }
                        self.advance(ch);
                    }
                }
                LexState::Quoted(quote) => {
                    self.advance(ch);
                    if ch == '\\' && quote != '`' {
                        if let Some(escaped) = self.rest().chars().next() {
                            self.advance(escaped);
                        }
                    } else if ch == quote {
                        self.state = LexState::Normal;
                    }
                }
                LexState::LineComment => {
                    self.advance(ch);
                    if ch == '\n' {
                        self.state = LexState::Normal;
                    }
                }
                LexState::BlockComment => {
                    if self.rest().starts_with("*/") {
                        self.advance_str("*/");
                        self.state = LexState::Normal;
                    } else {
                        self.advance(ch);
                    }
                }
            }
        }

        match self.state {
            LexState::Quoted(quote) => Err(ExplorerError::Parse {
                line: self.state_line,
                message: format!("unterminated {} quote", quote),
            }),
            LexState::BlockComment => Err(ExplorerError::Parse {
                line: self.state_line,
                message: "unterminated block comment".to_string(),
            }),
            LexState::Normal | LexState::LineComment => {
                self.finish_statement();
                Ok(self.statements)
            }
        }
    }

    /// `--` starts a comment only when followed by whitespace or end of input
    fn starts_line_comment(rest: &str) -> bool {
        rest.strip_prefix("--")
            .map(|after| after.chars().next().map_or(true, char::is_whitespace))
            .unwrap_or(false)
    }
}
