//! Saved-query parsing and matching.
//!
//! Watch evaluation only needs a yes/no answer per issue, so the seam is a
//! pair of narrow traits: [`QueryParser`] turns a query string into a boxed
//! [`IssueQuery`], and the query answers [`IssueQuery::matches`]. The stock
//! [`FilterQueryParser`] implements a small field-filter grammar:
//!
//! ```text
//! query  := "all" | clause (("and" | "or") clause)*
//! clause := state is "<label>"
//!         | title contains "<text>"
//!         | project is "<name>"
//! ```
//!
//! Connectives fold left with no precedence or parentheses. The `project`
//! field is only meaningful in the global scope; project-scoped parsing
//! rejects it.

use uuid::Uuid;

use crate::error::QueryParseError;
use crate::models::Issue;

/// A parsed saved query, ready to be matched against issues.
pub trait IssueQuery: Send + Sync {
    fn matches(&self, issue: &Issue) -> bool;
}

/// Parser seam for saved queries.
///
/// `project` carries the scope: `Some` when parsing a project-scoped query,
/// `None` for the instance-global scope.
#[cfg_attr(test, mockall::automock)]
pub trait QueryParser: Send + Sync {
    fn parse(
        &self,
        project: Option<Uuid>,
        query: &str,
    ) -> Result<Box<dyn IssueQuery>, QueryParseError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Clause {
    All,
    StateIs(String),
    TitleContains(String),
    ProjectIs(String),
}

impl Clause {
    fn matches(&self, issue: &Issue) -> bool {
        match self {
            Self::All => true,
            Self::StateIs(state) => issue.state.eq_ignore_ascii_case(state),
            Self::TitleContains(text) => issue
                .title
                .to_lowercase()
                .contains(&text.to_lowercase()),
            Self::ProjectIs(name) => issue.project.name.eq_ignore_ascii_case(name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connective {
    And,
    Or,
}

/// A parsed filter query: left-folded clauses.
#[derive(Debug)]
struct FilterQuery {
    first: Clause,
    rest: Vec<(Connective, Clause)>,
}

impl IssueQuery for FilterQuery {
    fn matches(&self, issue: &Issue) -> bool {
        let mut result = self.first.matches(issue);
        for (connective, clause) in &self.rest {
            result = match connective {
                Connective::And => result && clause.matches(issue),
                Connective::Or => result || clause.matches(issue),
            };
        }
        result
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Str(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>, QueryParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut literal = String::new();
            let mut closed = false;
            for ch in chars.by_ref() {
                if ch == '"' {
                    closed = true;
                    break;
                }
                literal.push(ch);
            }
            if !closed {
                return Err(QueryParseError::UnterminatedString);
            }
            tokens.push(Token::Str(literal));
        } else {
            let mut word = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() || ch == '"' {
                    break;
                }
                word.push(ch);
                chars.next();
            }
            tokens.push(Token::Word(word.to_ascii_lowercase()));
        }
    }
    Ok(tokens)
}

/// Stock parser for the filter grammar.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterQueryParser;

impl FilterQueryParser {
    pub fn new() -> Self {
        Self
    }

    fn expect_keyword(
        tokens: &[Token],
        index: usize,
        keyword: &str,
    ) -> Result<(), QueryParseError> {
        match tokens.get(index) {
            Some(Token::Word(word)) if word == keyword => Ok(()),
            Some(Token::Word(word)) => Err(QueryParseError::UnexpectedToken(word.clone())),
            Some(Token::Str(literal)) => Err(QueryParseError::UnexpectedToken(literal.clone())),
            None => Err(QueryParseError::UnexpectedToken(String::new())),
        }
    }

    fn expect_literal(tokens: &[Token], index: usize) -> Result<String, QueryParseError> {
        match tokens.get(index) {
            Some(Token::Str(literal)) => Ok(literal.clone()),
            Some(Token::Word(word)) => Err(QueryParseError::UnexpectedToken(word.clone())),
            None => Err(QueryParseError::UnexpectedToken(String::new())),
        }
    }

    fn parse_clause(tokens: &[Token], index: usize) -> Result<(Clause, usize), QueryParseError> {
        match tokens.get(index) {
            Some(Token::Word(word)) if word == "all" => Ok((Clause::All, index + 1)),
            Some(Token::Word(word)) if word == "state" => {
                Self::expect_keyword(tokens, index + 1, "is")?;
                let literal = Self::expect_literal(tokens, index + 2)?;
                Ok((Clause::StateIs(literal), index + 3))
            }
            Some(Token::Word(word)) if word == "title" => {
                Self::expect_keyword(tokens, index + 1, "contains")?;
                let literal = Self::expect_literal(tokens, index + 2)?;
                Ok((Clause::TitleContains(literal), index + 3))
            }
            Some(Token::Word(word)) if word == "project" => {
                Self::expect_keyword(tokens, index + 1, "is")?;
                let literal = Self::expect_literal(tokens, index + 2)?;
                Ok((Clause::ProjectIs(literal), index + 3))
            }
            Some(Token::Word(word)) => Err(QueryParseError::UnknownField(word.clone())),
            Some(Token::Str(literal)) => Err(QueryParseError::UnexpectedToken(literal.clone())),
            None => Err(QueryParseError::Empty),
        }
    }
}

impl QueryParser for FilterQueryParser {
    fn parse(
        &self,
        project: Option<Uuid>,
        query: &str,
    ) -> Result<Box<dyn IssueQuery>, QueryParseError> {
        let tokens = tokenize(query)?;
        if tokens.is_empty() {
            return Err(QueryParseError::Empty);
        }

        let (first, mut index) = Self::parse_clause(&tokens, 0)?;
        let mut rest = Vec::new();
        while index < tokens.len() {
            let connective = match &tokens[index] {
                Token::Word(word) if word == "and" => Connective::And,
                Token::Word(word) if word == "or" => Connective::Or,
                Token::Word(word) => return Err(QueryParseError::UnexpectedToken(word.clone())),
                Token::Str(literal) => {
                    return Err(QueryParseError::UnexpectedToken(literal.clone()));
                }
            };
            let (clause, next) = Self::parse_clause(&tokens, index + 1)?;
            rest.push((connective, clause));
            index = next;
        }

        if project.is_some() {
            let references_project = std::iter::once(&first)
                .chain(rest.iter().map(|(_, clause)| clause))
                .any(|clause| matches!(clause, Clause::ProjectIs(_)));
            if references_project {
                return Err(QueryParseError::FieldNotApplicable("project".to_string()));
            }
        }

        Ok(Box::new(FilterQuery { first, rest }))
    }
}
