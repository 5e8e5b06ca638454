//! Query depth limiting.
//!
//! Every extra level of nesting in a query can multiply the number of database
//! round-trips the resolvers make, so documents whose operations nest deeper
//! than a configured limit are rejected before execution.
//!
//! Depth counts object-field levels along the deepest path of an operation:
//!
//! - `{ __typename }` has depth 0, since leaf fields add no level;
//! - `{ memberTypes { id } }` has depth 1;
//! - `{ user(id: $id) { posts { id } } }` has depth 2.
//!
//! Inline fragments and fragment spreads add no level by themselves, only the
//! fields inside them do.

use std::collections::HashMap;
use std::fmt;

use async_graphql::parser::types::{
    ExecutableDocument, FragmentDefinition, OperationDefinition, Selection, SelectionSet,
};
use async_graphql::{ErrorExtensionValues, Name, Pos, Positioned, ServerError, Value};

/// Hard ceiling on the number of nested selection sets the guard is willing
/// to walk, regardless of the configured limit. Nested fields, inline
/// fragments and fragment spreads all count towards it.
pub const MAX_RECURSION_DEPTH: usize = 128;

/// Upper bound on the selections visited while measuring a single operation.
/// Fragments are measured once and reused wherever they are spread, so only
/// documents that spread cyclic fragments over and over come anywhere near it.
pub const MAX_SELECTIONS_VISITED: usize = 10_000;

/// The outcome of [`DepthGuard::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(Vec<Diagnostic>),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

/// Why an operation was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DepthViolation {
    #[error("exceeds the maximum query depth: depth {depth} > limit {limit}")]
    DepthExceeded { depth: usize, limit: usize },
    #[error("spreads unknown fragment \"{name}\"")]
    UnresolvedFragment { name: String },
    #[error("nests selections deeper than the hard ceiling of {ceiling} levels")]
    RecursionLimitExceeded { ceiling: usize },
    #[error("takes more than {budget} selection visits to measure")]
    ComplexityLimitExceeded { budget: usize },
}

impl DepthViolation {
    /// Machine-readable error code, reported in the error's `extensions`.
    pub fn code(&self) -> &'static str {
        match self {
            DepthViolation::DepthExceeded { .. } => "DEPTH_LIMIT_EXCEEDED",
            DepthViolation::UnresolvedFragment { .. } => "UNRESOLVED_FRAGMENT",
            DepthViolation::RecursionLimitExceeded { .. } => "RECURSION_LIMIT_EXCEEDED",
            DepthViolation::ComplexityLimitExceeded { .. } => "COMPLEXITY_LIMIT_EXCEEDED",
        }
    }
}

/// A single reason for rejecting a document, tied to the operation it was
/// found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// `None` for an anonymous operation.
    pub operation: Option<String>,
    pub pos: Pos,
    pub violation: DepthViolation,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operation {
            Some(name) => write!(f, "Operation \"{}\" {}", name, self.violation),
            None => write!(f, "Anonymous operation {}", self.violation),
        }
    }
}

impl From<Diagnostic> for ServerError {
    fn from(diagnostic: Diagnostic) -> Self {
        let mut extensions = ErrorExtensionValues::default();
        extensions.set("code", Value::String(diagnostic.violation.code().to_string()));
        if let Some(name) = &diagnostic.operation {
            extensions.set("operation", Value::String(name.clone()));
        }
        match &diagnostic.violation {
            DepthViolation::DepthExceeded { depth, limit } => {
                extensions.set("depth", Value::Number((*depth as u64).into()));
                extensions.set("limit", Value::Number((*limit as u64).into()));
            }
            DepthViolation::UnresolvedFragment { name } => {
                extensions.set("fragment", Value::String(name.clone()));
            }
            DepthViolation::RecursionLimitExceeded { .. }
            | DepthViolation::ComplexityLimitExceeded { .. } => {}
        }

        let mut error = ServerError::new(diagnostic.to_string(), Some(diagnostic.pos));
        error.extensions = Some(extensions);
        error
    }
}

/// Rejects documents whose operations nest deeper than `limit`.
///
/// The guard holds no state besides its limit; evaluation is a pure function
/// of the document, so one guard can be shared by all request handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthGuard {
    limit: usize,
}

impl DepthGuard {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Evaluates every operation in `document` independently. The document is
    /// rejected if any of them violates the limit, with one or more
    /// diagnostics per offending operation.
    ///
    /// Diagnostics are ordered by operation name, the anonymous operation
    /// first.
    pub fn evaluate(&self, document: &ExecutableDocument) -> Verdict {
        let mut operations: Vec<_> = document.operations.iter().collect();
        operations.sort_by_key(|(name, _)| name.map(Name::as_str));

        let diagnostics: Vec<Diagnostic> = operations
            .into_iter()
            .flat_map(|(name, operation)| {
                self.evaluate_operation(name.map(Name::to_string), operation, &document.fragments)
            })
            .collect();

        if diagnostics.is_empty() {
            Verdict::Accepted
        } else {
            Verdict::Rejected(diagnostics)
        }
    }

    fn evaluate_operation(
        &self,
        name: Option<String>,
        operation: &Positioned<OperationDefinition>,
        fragments: &HashMap<Name, Positioned<FragmentDefinition>>,
    ) -> Vec<Diagnostic> {
        let measurement = measure(&operation.node.selection_set.node, fragments);
        let diagnostic = |violation| Diagnostic {
            operation: name.clone(),
            pos: operation.pos,
            violation,
        };

        let mut diagnostics: Vec<Diagnostic> = measurement
            .unresolved
            .into_iter()
            .map(|fragment| diagnostic(DepthViolation::UnresolvedFragment { name: fragment }))
            .collect();

        if measurement.ceiling_reached {
            diagnostics.push(diagnostic(DepthViolation::RecursionLimitExceeded {
                ceiling: MAX_RECURSION_DEPTH,
            }));
        }
        if measurement.budget_exhausted {
            diagnostics.push(diagnostic(DepthViolation::ComplexityLimitExceeded {
                budget: MAX_SELECTIONS_VISITED,
            }));
        }
        if measurement.depth > self.limit {
            diagnostics.push(diagnostic(DepthViolation::DepthExceeded {
                depth: measurement.depth,
                limit: self.limit,
            }));
        }

        diagnostics
    }
}

struct Measurement {
    depth: usize,
    /// Names of spread fragments missing from the document, deduplicated, in
    /// the order they were first encountered.
    unresolved: Vec<String>,
    ceiling_reached: bool,
    budget_exhausted: bool,
}

fn measure(
    selection_set: &SelectionSet,
    fragments: &HashMap<Name, Positioned<FragmentDefinition>>,
) -> Measurement {
    let mut walker = DepthWalker {
        fragments,
        visiting: Vec::new(),
        measured: HashMap::new(),
        unresolved: Vec::new(),
        nesting: 0,
        deepest_nesting: 0,
        cycle_cuts: 0,
        visited: 0,
        ceiling_reached: false,
        budget_exhausted: false,
    };
    let depth = walker.selection_set_depth(selection_set, 0);

    Measurement {
        depth,
        unresolved: walker.unresolved,
        ceiling_reached: walker.ceiling_reached,
        budget_exhausted: walker.budget_exhausted,
    }
}

/// What a fragment adds wherever it is spread.
#[derive(Debug, Clone, Copy)]
struct FragmentShape {
    /// Object-field levels below the spread.
    depth: usize,
    /// Nested selection sets below the spread, the fragment's own included.
    nesting: usize,
}

struct DepthWalker<'a> {
    fragments: &'a HashMap<Name, Positioned<FragmentDefinition>>,
    /// Fragments on the current path, used to cut cycles. Siblings may spread
    /// the same fragment again.
    visiting: Vec<&'a str>,
    /// Fragments whose walk met neither a cycle nor a limit. Their shape is
    /// the same wherever they are spread.
    measured: HashMap<&'a str, FragmentShape>,
    unresolved: Vec<String>,
    nesting: usize,
    deepest_nesting: usize,
    cycle_cuts: usize,
    visited: usize,
    ceiling_reached: bool,
    budget_exhausted: bool,
}

impl<'a> DepthWalker<'a> {
    fn selection_set_depth(&mut self, selection_set: &'a SelectionSet, depth: usize) -> usize {
        if self.budget_exhausted {
            return depth;
        }
        if self.nesting >= MAX_RECURSION_DEPTH {
            self.ceiling_reached = true;
            return depth;
        }

        self.nesting += 1;
        self.deepest_nesting = self.deepest_nesting.max(self.nesting);
        let mut max_depth = depth;
        for selection in &selection_set.items {
            self.visited += 1;
            if self.visited > MAX_SELECTIONS_VISITED {
                self.budget_exhausted = true;
                break;
            }

            let selection_depth = match &selection.node {
                Selection::Field(field) => {
                    let nested = &field.node.selection_set.node;
                    if nested.items.is_empty() {
                        depth
                    } else {
                        self.selection_set_depth(nested, depth + 1)
                    }
                }
                Selection::InlineFragment(inline_fragment) => {
                    self.selection_set_depth(&inline_fragment.node.selection_set.node, depth)
                }
                Selection::FragmentSpread(spread) => {
                    self.fragment_depth(&spread.node.fragment_name.node, depth)
                }
            };
            max_depth = max_depth.max(selection_depth);
        }
        self.nesting -= 1;

        max_depth
    }

    fn fragment_depth(&mut self, name: &'a Name, depth: usize) -> usize {
        if self.visiting.contains(&name.as_str()) {
            // Cycles are left for the executor's validation to report.
            self.cycle_cuts += 1;
            return depth;
        }

        if let Some(shape) = self.measured.get(name.as_str()).copied() {
            if self.nesting + shape.nesting > MAX_RECURSION_DEPTH {
                self.ceiling_reached = true;
            }
            self.deepest_nesting = self.deepest_nesting.max(self.nesting + shape.nesting);
            return depth + shape.depth;
        }

        let Some(fragment) = self.fragments.get(name) else {
            if !self.unresolved.iter().any(|unresolved| unresolved == name.as_str()) {
                self.unresolved.push(name.to_string());
            }
            return depth;
        };

        let cycle_cuts = self.cycle_cuts;
        let outer_deepest_nesting = std::mem::replace(&mut self.deepest_nesting, self.nesting);

        self.visiting.push(name.as_str());
        let fragment_depth = self.selection_set_depth(&fragment.node.selection_set.node, depth);
        self.visiting.pop();

        let shape = FragmentShape {
            depth: fragment_depth - depth,
            nesting: self.deepest_nesting - self.nesting,
        };
        self.deepest_nesting = self.deepest_nesting.max(outer_deepest_nesting);
        if cycle_cuts == self.cycle_cuts && !self.ceiling_reached && !self.budget_exhausted {
            self.measured.insert(name.as_str(), shape);
        }

        fragment_depth
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use async_graphql::parser::parse_query;
    use quickcheck::TestResult;
    use quickcheck_macros::quickcheck;

    use super::*;

    fn evaluate(query: &str, limit: usize) -> Verdict {
        let document = parse_query(query).unwrap();
        DepthGuard::new(limit).evaluate(&document)
    }

    /// The smallest limit the query is accepted with.
    fn depth_of(query: &str) -> usize {
        let document = parse_query(query).unwrap();
        (0..MAX_RECURSION_DEPTH)
            .find(|limit| DepthGuard::new(*limit).evaluate(&document).is_accepted())
            .unwrap()
    }

    fn rejections(verdict: Verdict) -> Vec<Diagnostic> {
        match verdict {
            Verdict::Accepted => panic!("expected the document to be rejected"),
            Verdict::Rejected(diagnostics) => diagnostics,
        }
    }

    /// `levels` nested object fields, e.g. `{ a { a { a { id } } } }` for 3.
    fn nested_query(levels: usize) -> String {
        let mut query = "id".to_string();
        for _ in 0..levels {
            query = format!("a {{ {query} }}");
        }
        format!("{{ {query} }}")
    }

    #[test]
    fn member_types_query_is_accepted() {
        assert_eq!(evaluate("{ memberTypes { id } }", 5), Verdict::Accepted);
    }

    #[test]
    fn flat_query_has_no_depth() {
        assert_eq!(depth_of("{ __typename }"), 0);
        assert_eq!(depth_of("{ a b c }"), 0);
        assert_eq!(evaluate("{ __typename }", 0), Verdict::Accepted);
    }

    #[test]
    fn nested_object_field_adds_one_level() {
        assert_eq!(depth_of("{ memberTypes { id } }"), 1);
        assert_eq!(depth_of("{ users { id posts { id } } }"), 2);
        assert_eq!(depth_of("{ users { posts { id } profile { memberType { id } } } }"), 3);
    }

    #[test]
    fn deep_query_is_rejected_with_measured_depth() {
        let query = r#"
            query userFeed($id: UUID!) {
                user(id: $id) {
                    userSubscribedTo {
                        posts { id title }
                    }
                }
            }
        "#;

        let diagnostics = rejections(evaluate(query, 1));
        assert_eq!(
            diagnostics,
            vec![Diagnostic {
                operation: Some("userFeed".to_string()),
                pos: Pos {
                    line: 2,
                    column: 13
                },
                violation: DepthViolation::DepthExceeded { depth: 3, limit: 1 },
            }]
        );
        assert!(diagnostics[0].to_string().contains("depth 3 > limit 1"));
        assert!(diagnostics[0].to_string().contains("userFeed"));
    }

    #[test]
    fn inline_fragments_add_no_level() {
        assert_eq!(depth_of("{ ... on RootQueryType { __typename } }"), 0);
        assert_eq!(
            depth_of("{ users { ... on User { ... { posts { id } } } } }"),
            2
        );
    }

    #[test]
    fn fragment_spreads_add_no_level() {
        let query = r#"
            { users { ...UserFields } }
            fragment UserFields on User { id posts { id } }
        "#;
        assert_eq!(depth_of(query), 2);
    }

    #[test]
    fn sibling_branches_may_spread_the_same_fragment() {
        let query = r#"
            {
                users { ...Subscriptions }
                user(id: "x") { userSubscribedTo { ...Subscriptions } }
            }
            fragment Subscriptions on User { subscribedToUser { id } }
        "#;
        assert_eq!(depth_of(query), 3);
    }

    #[test]
    fn mutually_recursive_fragments_terminate() {
        let query = r#"
            { users { ...F } }
            fragment F on User { posts { id } subscribedToUser { ...G } }
            fragment G on User { userSubscribedTo { ...F } }
        "#;

        // users > subscribedToUser > userSubscribedTo, where F is cut.
        assert_eq!(depth_of(query), 3);
        let diagnostics = rejections(evaluate(query, 2));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].operation, None);
        assert_eq!(
            diagnostics[0].violation,
            DepthViolation::DepthExceeded { depth: 3, limit: 2 }
        );
        assert!(diagnostics[0]
            .to_string()
            .starts_with("Anonymous operation exceeds"));
    }

    #[test]
    fn self_referencing_fragment_terminates() {
        let query = r#"
            { users { ...F } }
            fragment F on User { userSubscribedTo { ...F } }
        "#;
        assert_eq!(depth_of(query), 2);
    }

    #[test]
    fn each_operation_is_evaluated_independently() {
        let query = r#"
            query shallow { memberTypes { id } }
            query deep { users { posts { id } } }
            query deeper { users { profile { memberType { id } } } }
        "#;

        assert_eq!(evaluate(query, 3), Verdict::Accepted);

        let diagnostics = rejections(evaluate(query, 1));
        let operations: Vec<_> = diagnostics
            .iter()
            .map(|diagnostic| diagnostic.operation.as_deref().unwrap())
            .collect();
        assert_eq!(operations, vec!["deep", "deeper"]);
        assert_eq!(
            diagnostics[1].violation,
            DepthViolation::DepthExceeded { depth: 3, limit: 1 }
        );
    }

    #[test]
    fn unresolved_fragment_is_reported() {
        let diagnostics = rejections(evaluate("query q { users { ...Missing ...Missing } }", 5));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].violation,
            DepthViolation::UnresolvedFragment {
                name: "Missing".to_string()
            }
        );
        assert_eq!(diagnostics[0].violation.code(), "UNRESOLVED_FRAGMENT");
    }

    #[test]
    fn long_fragment_chain_hits_the_ceiling() {
        let mut query = "{ ...F0 }\n".to_string();
        for i in 0..MAX_RECURSION_DEPTH + 10 {
            query.push_str(&format!("fragment F{i} on RootQueryType {{ ...F{} }}\n", i + 1));
        }
        query.push_str(&format!(
            "fragment F{} on RootQueryType {{ __typename }}\n",
            MAX_RECURSION_DEPTH + 10
        ));

        // The chain adds no depth, but it's rejected regardless of the limit.
        let diagnostics = rejections(evaluate(&query, usize::MAX));
        assert_eq!(
            diagnostics
                .iter()
                .map(|diagnostic| diagnostic.violation.clone())
                .collect::<Vec<_>>(),
            vec![DepthViolation::RecursionLimitExceeded {
                ceiling: MAX_RECURSION_DEPTH
            }]
        );
    }

    #[test]
    fn nested_inline_fragments_hit_the_ceiling() {
        let levels = MAX_RECURSION_DEPTH + 2;
        let query = format!(
            "{{ {}__typename{} }}",
            "... { ".repeat(levels),
            " }".repeat(levels)
        );

        let diagnostics = rejections(evaluate(&query, usize::MAX));
        assert_eq!(
            diagnostics
                .iter()
                .map(|diagnostic| diagnostic.violation.clone())
                .collect::<Vec<_>>(),
            vec![DepthViolation::RecursionLimitExceeded {
                ceiling: MAX_RECURSION_DEPTH
            }]
        );
    }

    #[test]
    fn reused_fragment_still_counts_towards_the_ceiling() {
        // `Deep` fits under the ceiling where it's first spread, but not at
        // the second spread, 40 inline fragments further down.
        let query = format!(
            "{{ ...Deep {}...Deep{} }}\nfragment Deep on RootQueryType {{ {}__typename{} }}",
            "... { ".repeat(40),
            " }".repeat(40),
            "... { ".repeat(100),
            " }".repeat(100),
        );

        let diagnostics = rejections(evaluate(&query, usize::MAX));
        assert_eq!(
            diagnostics[0].violation,
            DepthViolation::RecursionLimitExceeded {
                ceiling: MAX_RECURSION_DEPTH
            }
        );
    }

    /// `count` fragments, each spreading the next one twice. Walked naively,
    /// the last one would be visited `2^count` times.
    fn fragment_fan_out(count: usize, last: &str) -> String {
        let mut query = "query fanOut { ...F0 }\n".to_string();
        for i in 0..count {
            query.push_str(&format!(
                "fragment F{i} on RootQueryType {{ ...F{next} ...F{next} }}\n",
                next = i + 1
            ));
        }
        query.push_str(&format!("fragment F{count} on RootQueryType {{ {last} }}\n"));
        query
    }

    #[test]
    fn repeated_fragment_spreads_are_measured_once() {
        let query = fragment_fan_out(40, "users { posts { id } }");

        let started = Instant::now();
        assert_eq!(evaluate(&query, 2), Verdict::Accepted);
        let diagnostics = rejections(evaluate(&query, 1));
        assert!(started.elapsed() < Duration::from_secs(1));

        assert_eq!(
            diagnostics[0].violation,
            DepthViolation::DepthExceeded { depth: 2, limit: 1 }
        );
    }

    #[test]
    fn repeated_cyclic_spreads_exhaust_the_budget() {
        // The last fragment loops back to the first, so no fragment can be
        // measured once and reused.
        let query = fragment_fan_out(40, "__typename ...F0 ...F0");

        let started = Instant::now();
        let diagnostics = rejections(evaluate(&query, 5));
        assert!(started.elapsed() < Duration::from_secs(1));

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].operation.as_deref(), Some("fanOut"));
        assert_eq!(
            diagnostics[0].violation,
            DepthViolation::ComplexityLimitExceeded {
                budget: MAX_SELECTIONS_VISITED
            }
        );
        assert_eq!(diagnostics[0].violation.code(), "COMPLEXITY_LIMIT_EXCEEDED");
    }

    #[test]
    fn diagnostic_converts_into_server_error() {
        let diagnostic = Diagnostic {
            operation: Some("deep".to_string()),
            pos: Pos { line: 1, column: 1 },
            violation: DepthViolation::DepthExceeded { depth: 7, limit: 5 },
        };

        let error = ServerError::from(diagnostic);
        assert_eq!(
            error.message,
            "Operation \"deep\" exceeds the maximum query depth: depth 7 > limit 5"
        );
        assert_eq!(error.locations, vec![Pos { line: 1, column: 1 }]);

        let extensions = serde_json::to_value(error.extensions.unwrap()).unwrap();
        assert_eq!(
            extensions,
            serde_json::json!({
                "code": "DEPTH_LIMIT_EXCEEDED",
                "operation": "deep",
                "depth": 7,
                "limit": 5,
            })
        );
    }

    #[quickcheck]
    fn nesting_within_limit_is_accepted(levels: u8, slack: u8) -> bool {
        let levels = levels as usize % 20;
        let limit = levels + slack as usize % 10;
        evaluate(&nested_query(levels), limit).is_accepted()
    }

    #[quickcheck]
    fn nesting_beyond_limit_is_rejected(levels: u8, limit: u8) -> TestResult {
        let levels = levels as usize % 20;
        let limit = limit as usize % 20;
        if levels <= limit {
            return TestResult::discard();
        }

        let diagnostics = rejections(evaluate(&nested_query(levels), limit));
        TestResult::from_bool(
            diagnostics.len() == 1
                && diagnostics[0].violation
                    == DepthViolation::DepthExceeded {
                        depth: levels,
                        limit,
                    },
        )
    }

    #[quickcheck]
    fn evaluation_is_idempotent(levels: u8, limit: u8) -> bool {
        let document = parse_query(nested_query(levels as usize % 20)).unwrap();
        let guard = DepthGuard::new(limit as usize % 20);
        guard.evaluate(&document) == guard.evaluate(&document)
    }
}
