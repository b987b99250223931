//! error types for tidescale-policy.

use thiserror::Error;

/// errors loading a policy document.
#[derive(Debug, Error)]
pub enum Error {
    /// the document is not valid json (after comments and trailing commas
    /// are removed).
    #[error("failed to parse policy JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    /// an acl entry failed validation.
    #[error("invalid acl at index {index}: {cause}")]
    InvalidAcl {
        /// zero-based index into `acls`.
        index: usize,
        /// what is wrong with it.
        cause: ValidationError,
    },

    /// a grant failed validation.
    #[error("invalid grant at index {index}: {cause}")]
    InvalidGrant {
        /// zero-based index into `grants`.
        index: usize,
        /// what is wrong with it.
        cause: ValidationError,
    },

    /// an ssh rule failed validation.
    #[error("invalid ssh rule at index {index}: {cause}")]
    InvalidSshRule {
        /// zero-based index into `ssh`.
        index: usize,
        /// what is wrong with it.
        cause: ValidationError,
    },

    /// an iam filter does not parse.
    #[error("invalid iam filter at index {index}: {cause}")]
    InvalidFilter {
        /// zero-based index into `filters`.
        index: usize,
        /// the syntax error.
        cause: ExprError,
    },

    /// a section other than acls, grants or ssh is malformed.
    #[error("invalid policy: {0}")]
    Invalid(#[from] ValidationError),

    /// an alias or capability string is malformed.
    #[error("failed to parse alias: {0}")]
    Parse(#[from] ParseError),
}

/// structural problems in a policy entry.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// entry has no sources.
    #[error("src cannot be empty")]
    EmptySrc,

    /// entry has no destinations.
    #[error("dst cannot be empty")]
    EmptyDst,

    /// grant has neither ip nor app capabilities.
    #[error("grant must have ip or app capabilities")]
    NoCapabilities,

    /// ssh rule lists no users.
    #[error("ssh rule must list at least one user")]
    EmptySshUsers,

    /// ssh `check` rule without a check period.
    #[error("ssh check rule requires checkPeriod")]
    MissingCheckPeriod,

    /// `tagOwners` key is not a tag.
    #[error("tagOwners key is not a tag: {0}")]
    InvalidTagOwner(String),

    /// `autoApprovers.routes` key is not a prefix.
    #[error("autoApprovers route is not a prefix: {0}")]
    InvalidRoute(String),

    /// `groups` key lacks the `group:` prefix.
    #[error("group name must start with 'group:': {0}")]
    InvalidGroupName(String),

    /// `hosts` value is not an address or prefix.
    #[error("host {name} has an invalid address: {value}")]
    InvalidHost {
        /// host alias.
        name: String,
        /// offending value.
        value: String,
    },

    /// only `accept` is supported.
    #[error("unsupported acl action: {0}")]
    UnsupportedAction(String),
}

/// syntax errors in alias and capability strings.
#[derive(Debug, Error)]
pub enum ParseError {
    /// unknown autogroup name.
    #[error("unknown autogroup: {0}")]
    UnknownAutogroup(String),

    /// invalid ip or prefix.
    #[error("invalid CIDR: {0}")]
    InvalidCidr(String),

    /// empty alias.
    #[error("alias cannot be empty")]
    EmptyAlias,

    /// `alias:ports` destination without the ports part.
    #[error("destination must have the form alias:ports: {0}")]
    MissingPorts(String),

    /// port is not a u16 or the range is inverted.
    #[error("invalid port: {0}")]
    InvalidPort(String),

    /// unknown protocol name.
    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),
}

/// a node asked for tags its user may not apply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagOwnerError {
    /// the tag has no entry in `tagOwners`.
    #[error("tag {0} is not defined in tagOwners")]
    UndefinedTag(String),

    /// the user is not among the tag's owners.
    #[error("user {user} does not own tag {tag}")]
    NotOwner {
        /// requested tag.
        tag: String,
        /// requesting user's login.
        user: String,
    },
}

/// errors parsing or evaluating an iam filter expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    /// character that starts no token.
    #[error("unexpected character {ch:?} at offset {offset}")]
    UnexpectedChar {
        /// byte offset into the expression.
        offset: usize,
        /// the character.
        ch: char,
    },

    /// string literal without a closing quote.
    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),

    /// the expression ended early.
    #[error("unexpected end of expression")]
    UnexpectedEnd,

    /// a token where something else was expected.
    #[error("unexpected token: {0}")]
    UnexpectedToken(String),

    /// operands of the wrong kind, e.g. `"a" && true`.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
}

/// result type for tidescale-policy operations.
pub type Result<T> = std::result::Result<T, Error>;
