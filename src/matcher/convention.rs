//! File-system routing conventions (Next.js pages and app router).

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use super::lexer::{Lexed, Token, TokenKind};

const VERBS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConventionKind {
    /// `pages/api/**`: one handler per file, methods branched on `req.method`
    PagesApi,
    /// `app/**/route.ts`: one exported function per method
    AppRouter,
}

/// A method declared by a convention file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConventionRoute {
    pub method: String,
    pub handler: Option<String>,
    pub line: u32,
    pub column: u32,
}

/// Route path implied by a file's location, or `None` when the file is not
/// routable (private folders, `_`-prefixed files, non-route files).
pub fn route_path(kind: ConventionKind, relative: &Path) -> Option<String> {
    let components: Vec<&str> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();
    let (file, dirs) = components.split_last()?;
    let stem = Path::new(file).file_stem()?.to_str()?;

    let mut segments: Vec<String> = Vec::new();
    match kind {
        ConventionKind::PagesApi => {
            let pages = dirs
                .windows(2)
                .position(|w| w[0] == "pages" && w[1] == "api")?;
            for dir in &dirs[pages + 1..] {
                if dir.starts_with('_') {
                    return None;
                }
                segments.push(dynamic_segment(dir));
            }
            if stem.starts_with('_') {
                return None;
            }
            if stem != "index" {
                segments.push(dynamic_segment(stem));
            }
        }
        ConventionKind::AppRouter => {
            if stem != "route" {
                return None;
            }
            let app = dirs.iter().position(|d| *d == "app")?;
            for dir in &dirs[app + 1..] {
                if dir.starts_with('_') {
                    return None;
                }
                let is_group = dir.starts_with('(') && dir.ends_with(')');
                if is_group || dir.starts_with('@') {
                    continue;
                }
                segments.push(dynamic_segment(dir));
            }
        }
    }
    Some(format!("/{}", segments.join("/")))
}

/// `[id]` → `:id`, `[...slug]` and `[[...slug]]` → `:slug*`
fn dynamic_segment(segment: &str) -> String {
    if let Some(inner) = segment
        .strip_prefix("[[...")
        .and_then(|s| s.strip_suffix("]]"))
    {
        return format!(":{}*", inner);
    }
    if let Some(inner) = segment.strip_prefix("[...").and_then(|s| s.strip_suffix(']')) {
        return format!(":{}*", inner);
    }
    if let Some(inner) = segment.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        return format!(":{}", inner);
    }
    segment.to_string()
}

pub fn routes(kind: ConventionKind, lexed: &Lexed) -> Vec<ConventionRoute> {
    match kind {
        ConventionKind::PagesApi => pages_routes(&lexed.tokens),
        ConventionKind::AppRouter => app_routes(&lexed.tokens),
    }
}

fn pages_routes(tokens: &[Token]) -> Vec<ConventionRoute> {
    let (handler, export_at) = default_export(tokens);
    let mut routes: Vec<ConventionRoute> = Vec::new();
    let push = |method: &str, token: &Token, routes: &mut Vec<ConventionRoute>| {
        if !routes.iter().any(|r| r.method == method) {
            routes.push(ConventionRoute {
                method: method.to_string(),
                handler: handler.clone(),
                line: token.line,
                column: token.column,
            });
        }
    };

    let branches_on_method = tokens
        .windows(2)
        .any(|w| w[0].is_punct('.') && w[1].is_ident("method"));
    for i in 0..tokens.len() {
        // req.method === 'POST'
        if tokens[i].is_ident("method") && i > 0 && tokens[i - 1].is_punct('.') {
            let literal = tokens[i + 1..]
                .iter()
                .take(4)
                .skip_while(|t| t.is_punct('=') || t.is_punct('!'))
                .next()
                .filter(|t| t.kind == TokenKind::Str);
            if let Some(lit) = literal {
                let method = lit.text.to_uppercase();
                if VERBS.contains(&method.as_str()) {
                    push(&method, lit, &mut routes);
                }
            }
        }
        // switch (req.method) { case 'GET': ... }
        if branches_on_method && tokens[i].is_ident("case") {
            if let Some(lit) = tokens.get(i + 1).filter(|t| t.kind == TokenKind::Str) {
                let method = lit.text.to_uppercase();
                if VERBS.contains(&method.as_str()) {
                    push(&method, lit, &mut routes);
                }
            }
        }
    }

    if routes.is_empty() {
        let (line, column) = export_at
            .and_then(|i| tokens.get(i))
            .map(|t| (t.line, t.column))
            .unwrap_or((1, 1));
        routes.push(ConventionRoute {
            method: "GET".to_string(),
            handler,
            line,
            column,
        });
    }
    routes
}

/// Name of the default export and the index of its `export` token.
fn default_export(tokens: &[Token]) -> (Option<String>, Option<usize>) {
    for i in 0..tokens.len() {
        if !(tokens[i].is_ident("export")
            && tokens.get(i + 1).map(|t| t.is_ident("default")) == Some(true))
        {
            continue;
        }
        let mut j = i + 2;
        if tokens.get(j).map(|t| t.is_ident("async")) == Some(true) {
            j += 1;
        }
        if tokens.get(j).map(|t| t.is_ident("function")) == Some(true) {
            j += 1;
        }
        let name = tokens
            .get(j)
            .filter(|t| t.kind == TokenKind::Ident && !t.is_ident("function"))
            .map(|t| t.text.clone());
        return (name, Some(i));
    }
    (None, None)
}

fn app_routes(tokens: &[Token]) -> Vec<ConventionRoute> {
    let mut routes: Vec<ConventionRoute> = Vec::new();
    let push = |method: &str, handler: &str, token: &Token, routes: &mut Vec<ConventionRoute>| {
        if !routes.iter().any(|r| r.method == method) {
            routes.push(ConventionRoute {
                method: method.to_string(),
                handler: Some(handler.to_string()),
                line: token.line,
                column: token.column,
            });
        }
    };

    for i in 0..tokens.len() {
        if !tokens[i].is_ident("export") {
            continue;
        }
        let mut j = i + 1;
        if tokens.get(j).map(|t| t.is_ident("async")) == Some(true) {
            j += 1;
        }
        let Some(next) = tokens.get(j) else {
            continue;
        };

        // export async function GET() / export const GET = ...
        if next.is_ident("function") || next.is_ident("const") || next.is_ident("let") {
            if let Some(name) = tokens.get(j + 1).filter(|t| is_verb(t)) {
                push(&name.text, &name.text, name, &mut routes);
            }
            continue;
        }

        // export { handler as GET, handler as POST }
        if next.is_punct('{') {
            let mut k = j + 1;
            while let Some(t) = tokens.get(k) {
                if t.is_punct('}') {
                    break;
                }
                if t.is_ident("as") {
                    if let (Some(local), Some(name)) = (tokens.get(k - 1), tokens.get(k + 1)) {
                        if is_verb(name) {
                            push(&name.text, &local.text, name, &mut routes);
                        }
                    }
                } else if is_verb(t)
                    && tokens.get(k + 1).map(|n| n.is_ident("as")) != Some(true)
                    && tokens.get(k.wrapping_sub(1)).map(|p| p.is_ident("as")) != Some(true)
                {
                    push(&t.text, &t.text, t, &mut routes);
                }
                k += 1;
            }
        }
    }
    routes
}

fn is_verb(token: &Token) -> bool {
    token.kind == TokenKind::Ident && VERBS.contains(&token.text.as_str())
}
