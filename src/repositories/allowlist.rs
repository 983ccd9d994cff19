//! Fixed allow-list of audit-relevant endpoints for per-user activity
//! views. Raw traffic includes high-volume, low-signal paths (health
//! checks, asset fetches); activity views only show these maintained
//! administrative endpoints.

/// Route pattern: either an exact path or a template where `{id}` matches
/// exactly one path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathPattern {
    Exact(&'static str),
    Template(&'static str),
}

pub const ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE"];

pub const INCLUDED_PATHS: &[PathPattern] = &[
    PathPattern::Exact("/notification-settings"),
    PathPattern::Exact("/password/new"),
    PathPattern::Exact("/profile/avatar"),
    PathPattern::Exact("/profile/info"),
    PathPattern::Template("/session/{id}"),
    PathPattern::Exact("/session/login"),
    PathPattern::Exact("/session/logout"),
    PathPattern::Exact("/staff"),
    PathPattern::Template("/staff/{id}"),
    PathPattern::Template("/staff/avatar-del/{id}"),
    PathPattern::Template("/staff/avatar/{id}"),
    PathPattern::Exact("/staff/change-email"),
    PathPattern::Exact("/staff/change-password"),
    PathPattern::Exact("/staff/permissions/add"),
    PathPattern::Exact("/staff/permissions/remove"),
    PathPattern::Exact("/staff/projects/add"),
    PathPattern::Exact("/staff/projects/remove"),
    PathPattern::Template("/staff/session/{id}/{id}"),
];

impl PathPattern {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Exact(expected) => *expected == path,
            PathPattern::Template(template) => template_matches(template, path),
        }
    }

    /// Anchored regex equivalent, for the store-side `match()` filter.
    pub fn to_regex(&self) -> String {
        let template = match self {
            PathPattern::Exact(path) => path,
            PathPattern::Template(template) => template,
        };
        let mut regex = String::from("^");
        for segment in template.trim_start_matches('/').split('/') {
            regex.push('/');
            if segment == "{id}" {
                regex.push_str("[^/]+");
            } else {
                regex.push_str(&escape_regex(segment));
            }
        }
        regex.push('$');
        regex
    }
}

/// True when the (method, path) pair is auditable for activity views.
pub fn is_allowed(method: &str, path: &str) -> bool {
    ALLOWED_METHODS.contains(&method) && INCLUDED_PATHS.iter().any(|p| p.matches(path))
}

/// Builds the parameterized predicate restricting activity queries to the
/// allow-list. Returns the clause (with `?` placeholders) and the values
/// to bind, in order. Only placeholders reach the query text; the
/// patterns themselves never get interpolated.
pub fn sql_predicate() -> (String, Vec<String>) {
    let mut values = Vec::new();

    let method_marks = vec!["?"; ALLOWED_METHODS.len()].join(", ");
    values.extend(ALLOWED_METHODS.iter().map(|m| m.to_string()));

    let mut path_clauses = Vec::new();
    for pattern in INCLUDED_PATHS {
        match pattern {
            PathPattern::Exact(path) => {
                path_clauses.push("path = ?".to_string());
                values.push((*path).to_string());
            }
            PathPattern::Template(_) => {
                path_clauses.push("match(path, ?)".to_string());
                values.push(pattern.to_regex());
            }
        }
    }

    let clause = format!(
        "(method IN ({method_marks}) AND ({}))",
        path_clauses.join(" OR ")
    );
    (clause, values)
}

fn template_matches(template: &str, path: &str) -> bool {
    let template_segments: Vec<&str> = template.trim_start_matches('/').split('/').collect();
    let path_segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    if template_segments.len() != path_segments.len() {
        return false;
    }
    template_segments
        .iter()
        .zip(&path_segments)
        .all(|(t, p)| (*t == "{id}" && !p.is_empty()) || t == p)
}

fn escape_regex(segment: &str) -> String {
    let mut escaped = String::with_capacity(segment.len());
    for c in segment.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            escaped.push(c);
        } else {
            escaped.push('\\');
            escaped.push(c);
        }
    }
    escaped
}
