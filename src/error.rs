use thiserror::Error;

/// Marker carried by every authorization guard emitted into a statement.
pub const FORBIDDEN_MARKER: &str = "@neo4j/graphql/FORBIDDEN";

/// Marker prefix carried by relationship cardinality guards.
pub const RELATIONSHIP_REQUIRED_MARKER: &str = "@neo4j/graphql/RELATIONSHIP-REQUIRED";

/// Central error type for schema construction, translation and execution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphQLError {
    /// GraphQL document or type definition syntax errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Malformed directive usage, detected while building the entity model
    #[error("Schema validation error: {message}")]
    SchemaValidation { message: String },

    /// Malformed or inconsistent argument trees and selections
    #[error("{message}")]
    Translation { message: String },

    /// Field resolution errors
    #[error("Unknown field \"{field}\" on type \"{type_name}\"")]
    FieldNotFound { field: String, type_name: String },

    /// An authorization guard evaluated false
    #[error("Forbidden")]
    Forbidden,

    /// A single relationship ended up with zero or many edges
    #[error("{message}")]
    RelationshipCardinalityViolation { message: String },

    /// Failures reported by the graph database driver
    #[error("Driver error: {message}")]
    Driver { message: String },
}

impl GraphQLError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub fn schema_validation(message: impl Into<String>) -> Self {
        Self::SchemaValidation {
            message: message.into(),
        }
    }

    pub fn translation(message: impl Into<String>) -> Self {
        Self::Translation {
            message: message.into(),
        }
    }

    pub fn field_not_found(field: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::FieldNotFound {
            field: field.into(),
            type_name: type_name.into(),
        }
    }

    pub fn cardinality(message: impl Into<String>) -> Self {
        Self::RelationshipCardinalityViolation {
            message: message.into(),
        }
    }

    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// Classifies an error message reported by the database. Guards raised by
    /// `apoc.util.validate` surface with their marker somewhere in the message.
    pub fn from_driver_message(message: &str) -> Self {
        if message.contains(FORBIDDEN_MARKER) {
            return Self::Forbidden;
        }
        match message.find(RELATIONSHIP_REQUIRED_MARKER) {
            Some(ix) => {
                let detail = &message[ix + RELATIONSHIP_REQUIRED_MARKER.len()..];
                let detail = detail.split(['\n', '"', '\'']).next().unwrap_or_default();
                Self::cardinality(detail.trim().to_string())
            }
            None => Self::driver(message),
        }
    }

    /// Machine readable code exposed in GraphQL error extensions
    pub fn code(&self) -> &'static str {
        match self {
            Self::Parse(_) => "GRAPHQL_PARSE_FAILED",
            Self::SchemaValidation { .. } => "SCHEMA_VALIDATION_FAILED",
            Self::Translation { .. } | Self::FieldNotFound { .. } => "GRAPHQL_VALIDATION_FAILED",
            Self::Forbidden => "FORBIDDEN",
            Self::RelationshipCardinalityViolation { .. } => "RELATIONSHIP_REQUIRED",
            Self::Driver { .. } => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl From<graphql_parser::query::ParseError> for GraphQLError {
    fn from(err: graphql_parser::query::ParseError) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<graphql_parser::schema::ParseError> for GraphQLError {
    fn from(err: graphql_parser::schema::ParseError) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Type alias for Results that use GraphQLError
pub type GraphQLResult<T> = Result<T, GraphQLError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_forbidden_driver_messages() {
        let err = GraphQLError::from_driver_message(
            "Failed to invoke procedure `apoc.util.validate`: Caused by: java.lang.RuntimeException: @neo4j/graphql/FORBIDDEN",
        );
        assert_eq!(err, GraphQLError::Forbidden);
        assert_eq!(err.code(), "FORBIDDEN");
    }

    #[test]
    fn classifies_cardinality_driver_messages() {
        let err = GraphQLError::from_driver_message(
            "RuntimeException: @neo4j/graphql/RELATIONSHIP-REQUIREDMovie.director required exactly once",
        );
        assert_eq!(
            err,
            GraphQLError::cardinality("Movie.director required exactly once")
        );
    }

    #[test]
    fn other_driver_messages_are_passed_through() {
        let err = GraphQLError::from_driver_message("connection reset");
        assert_eq!(err, GraphQLError::driver("connection reset"));
    }
}
