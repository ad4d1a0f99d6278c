/// GraphQL field, argument and directive name constants used throughout the codebase
///
/// This module centralizes all magic strings to prevent typos and make refactoring easier.

/// GraphQL introspection field names
pub mod introspection {
    pub const TYPENAME: &str = "__typename";
}

/// Connection-related field names
pub mod connection {
    pub const EDGES: &str = "edges";
    pub const NODE: &str = "node";
    pub const EDGE: &str = "edge";
    pub const PAGE_INFO: &str = "pageInfo";
    pub const TOTAL_COUNT: &str = "totalCount";
    pub const CURSOR: &str = "cursor";
    pub const CURSOR_PREFIX: &str = "arrayconnection:";
}

/// PageInfo field names
pub mod page_info {
    pub const HAS_NEXT_PAGE: &str = "hasNextPage";
    pub const HAS_PREVIOUS_PAGE: &str = "hasPreviousPage";
    pub const START_CURSOR: &str = "startCursor";
    pub const END_CURSOR: &str = "endCursor";
}

/// Query and mutation argument names
pub mod args {
    pub const WHERE: &str = "where";
    pub const OPTIONS: &str = "options";
    pub const SORT: &str = "sort";
    pub const LIMIT: &str = "limit";
    pub const OFFSET: &str = "offset";
    pub const FIRST: &str = "first";
    pub const AFTER: &str = "after";
    pub const DIRECTED: &str = "directed";
    pub const INPUT: &str = "input";
    pub const UPDATE: &str = "update";
    pub const CREATE: &str = "create";
    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
    pub const DELETE: &str = "delete";
    pub const CONNECT_OR_CREATE: &str = "connectOrCreate";
    pub const NODE: &str = "node";
    pub const EDGE: &str = "edge";
    pub const ON_CREATE: &str = "onCreate";
    pub const OVERWRITE: &str = "overwrite";
}

/// Logical filter combinators
pub mod logical {
    pub const AND: &str = "AND";
    pub const OR: &str = "OR";
    pub const NOT: &str = "NOT";
    pub const TYPENAME_IN: &str = "typename_IN";
}

/// Mutation response members
pub mod mutation {
    pub const INFO: &str = "info";
    pub const BOOKMARK: &str = "bookmark";
    pub const NODES_CREATED: &str = "nodesCreated";
    pub const NODES_DELETED: &str = "nodesDeleted";
    pub const RELATIONSHIPS_CREATED: &str = "relationshipsCreated";
    pub const RELATIONSHIPS_DELETED: &str = "relationshipsDeleted";
    pub const EMPTY_INPUT: &str = "_emptyInput";
}

/// Aggregate selection members
pub mod aggregate {
    pub const COUNT: &str = "count";
    pub const MIN: &str = "min";
    pub const MAX: &str = "max";
    pub const AVERAGE: &str = "average";
    pub const SUM: &str = "sum";
    pub const SHORTEST: &str = "shortest";
    pub const LONGEST: &str = "longest";
}

/// Names of the directives consumed while building the entity model
pub mod directives {
    pub const RELATIONSHIP: &str = "relationship";
    pub const RELATIONSHIP_PROPERTIES: &str = "relationshipProperties";
    pub const DECLARE_RELATIONSHIP: &str = "declareRelationship";
    pub const AUTH: &str = "auth";
    pub const AUTHORIZATION: &str = "authorization";
    pub const ALIAS: &str = "alias";
    pub const UNIQUE: &str = "unique";
    pub const ID: &str = "id";
    pub const TIMESTAMP: &str = "timestamp";
    pub const MUTATION: &str = "mutation";
    pub const DEFAULT: &str = "default";
    pub const CYPHER: &str = "cypher";
    pub const POPULATED_BY: &str = "populatedBy";
    pub const PLURAL: &str = "plural";
}

/// Deprecation notices attached to legacy generated members
pub mod deprecation {
    pub const NEGATION: &str =
        "Negation filters will be deprecated, use the NOT operator to achieve the same behavior";
    pub const AGGREGATION: &str =
        "Aggregation filters that are not relying on an aggregating function will be deprecated.";
    pub const LENGTH: &str = "Please use the explicit _LENGTH version for string aggregation.";
}
