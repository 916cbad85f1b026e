//! Same-file route prefixes: router groups, prefixed routers and group blocks.

use std::collections::HashMap;

use super::lexer::{Token, TokenKind};
use super::template::{matching_close, split_args};

#[derive(Debug, Clone, Copy)]
pub enum PrefixRule {
    /// `v1 := r.Group("/v1")`; nests through the parent binding
    GroupCall { method: &'static str },
    /// `router = APIRouter(prefix="/items")`
    Constructor {
        name: &'static str,
        kwarg: &'static str,
    },
    /// `Route::prefix('admin')->group(function () { ... })` and
    /// `Route::group(['prefix' => 'admin'], function () { ... })`
    LaravelGroup,
}

#[derive(Debug, Clone)]
struct Block {
    start: usize,
    end: usize,
    prefix: String,
}

/// Prefixes resolved for one file.
#[derive(Debug, Clone, Default)]
pub struct Prefixes {
    bindings: HashMap<String, String>,
    blocks: Vec<Block>,
}

impl Prefixes {
    pub fn collect(rules: &[PrefixRule], tokens: &[Token]) -> Self {
        let mut prefixes = Prefixes::default();
        for rule in rules {
            match rule {
                PrefixRule::GroupCall { method } => prefixes.collect_groups(method, tokens),
                PrefixRule::Constructor { name, kwarg } => {
                    prefixes.collect_constructors(name, kwarg, tokens)
                }
                PrefixRule::LaravelGroup => prefixes.collect_laravel_groups(tokens),
            }
        }
        prefixes.blocks.sort_by_key(|b| (b.start, std::cmp::Reverse(b.end)));
        prefixes
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty() && self.blocks.is_empty()
    }

    /// Joins the prefixes that apply to a route declared at `token_index`
    /// through `receiver`.
    pub fn apply(&self, receiver: Option<&str>, token_index: usize, path: &str) -> String {
        let mut joined = String::new();
        for block in &self.blocks {
            if block.start < token_index && token_index < block.end {
                joined = join_paths(&joined, &block.prefix);
            }
        }
        if let Some(bound) = receiver.and_then(|r| self.bindings.get(r)) {
            joined = join_paths(&joined, bound);
        }
        join_paths(&joined, path)
    }

    fn collect_groups(&mut self, method: &str, tokens: &[Token]) {
        for i in 0..tokens.len() {
            let Some(value_at) = assignment_value(tokens, i) else {
                continue;
            };
            let is_group = tokens.get(value_at).map(|t| t.kind == TokenKind::Ident) == Some(true)
                && tokens.get(value_at + 1).map(|t| t.is_punct('.')) == Some(true)
                && tokens.get(value_at + 2).map(|t| t.is_ident(method)) == Some(true)
                && tokens.get(value_at + 3).map(|t| t.is_punct('(')) == Some(true);
            if !is_group {
                continue;
            }
            let Some(path) = tokens.get(value_at + 4).filter(|t| t.kind == TokenKind::Str) else {
                continue;
            };
            let parent = self
                .bindings
                .get(&tokens[value_at].text)
                .cloned()
                .unwrap_or_default();
            self.bindings
                .insert(tokens[i].text.clone(), join_paths(&parent, &path.text));
        }
    }

    fn collect_constructors(&mut self, name: &str, kwarg: &str, tokens: &[Token]) {
        for i in 0..tokens.len() {
            let Some(mut at) = assignment_value(tokens, i) else {
                continue;
            };
            // module.Constructor(...)
            while tokens.get(at + 1).map(|t| t.is_punct('.')) == Some(true) {
                at += 2;
            }
            let is_ctor = tokens.get(at).map(|t| t.is_ident(name)) == Some(true)
                && tokens.get(at + 1).map(|t| t.is_punct('(')) == Some(true);
            if !is_ctor {
                continue;
            }
            let Some((args, _)) = split_args(tokens, at + 2) else {
                continue;
            };
            let prefix = args.iter().find_map(|&(start, end)| {
                let arg = &tokens[start..end];
                (arg.len() == 3
                    && arg[0].is_ident(kwarg)
                    && arg[1].is_punct('=')
                    && arg[2].kind == TokenKind::Str)
                    .then(|| arg[2].text.clone())
            });
            if let Some(prefix) = prefix {
                self.bindings.insert(tokens[i].text.clone(), prefix);
            }
        }
    }

    fn collect_laravel_groups(&mut self, tokens: &[Token]) {
        for i in 0..tokens.len() {
            let is_facade = tokens[i].is_ident("Route")
                && tokens.get(i + 1).map(|t| t.is_punct(':')) == Some(true)
                && tokens.get(i + 2).map(|t| t.is_punct(':')) == Some(true);
            if !is_facade {
                continue;
            }

            let mut cursor = i + 3;
            let mut prefix: Option<String> = None;
            while let Some(call) = tokens.get(cursor).filter(|t| t.kind == TokenKind::Ident) {
                if tokens.get(cursor + 1).map(|t| t.is_punct('(')) != Some(true) {
                    break;
                }
                let open = cursor + 1;
                let Some(close) = matching_close(tokens, open) else {
                    break;
                };

                if call.is_ident("prefix") {
                    prefix = tokens
                        .get(open + 1)
                        .filter(|t| t.kind == TokenKind::Str)
                        .map(|t| t.text.clone());
                } else if call.is_ident("group") {
                    let args = &tokens[open + 1..close];
                    if args.first().map(|t| t.is_punct('[')) == Some(true) {
                        if let Some(p) = array_prefix(args) {
                            prefix = Some(p);
                        }
                    }
                    let brace = args.iter().position(|t| t.is_punct('{')).map(|p| open + 1 + p);
                    if let (Some(prefix), Some(brace)) = (prefix.take(), brace) {
                        if let Some(end) = matching_close(tokens, brace) {
                            self.blocks.push(Block {
                                start: brace,
                                end,
                                prefix,
                            });
                        }
                    }
                    break;
                }

                let arrow = tokens.get(close + 1).map(|t| t.is_punct('-')) == Some(true)
                    && tokens.get(close + 2).map(|t| t.is_punct('>')) == Some(true);
                if !arrow {
                    break;
                }
                cursor = close + 3;
            }
        }
    }
}

/// `name = value`, `name := value` or `const name = value` starting at `i`;
/// returns the index of the value.
fn assignment_value(tokens: &[Token], i: usize) -> Option<usize> {
    let name = tokens.get(i)?;
    if name.kind != TokenKind::Ident {
        return None;
    }
    let mut at = i + 1;
    if tokens.get(at)?.is_punct(':') {
        at += 1;
    }
    if !tokens.get(at)?.is_punct('=') {
        return None;
    }
    let next = tokens.get(at + 1)?;
    if next.is_punct('=') || next.is_punct('>') {
        return None;
    }
    Some(at + 1)
}

/// `['prefix' => 'admin', ...]`
fn array_prefix(args: &[Token]) -> Option<String> {
    args.windows(4).find_map(|w| {
        (w[0].kind == TokenKind::Str
            && w[0].text == "prefix"
            && w[1].is_punct('=')
            && w[2].is_punct('>')
            && w[3].kind == TokenKind::Str)
            .then(|| w[3].text.clone())
    })
}

/// Joins two route segments with exactly one `/` between them.
pub fn join_paths(base: &str, path: &str) -> String {
    if base.is_empty() {
        return path.to_string();
    }
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frameworks::Language;
    use crate::matcher::lexer::Lexer;

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths("", "/users"), "/users");
        assert_eq!(join_paths("/api/", "/users"), "/api/users");
        assert_eq!(join_paths("admin", "users"), "admin/users");
        assert_eq!(join_paths("/api", ""), "/api");
    }

    #[test]
    fn test_go_groups_nest() {
        let src = r#"
r := gin.Default()
api := r.Group("/api")
v1 := api.Group("/v1")
v1.GET("/users", listUsers)
"#;
        let lexed = Lexer::tokenize(src, Language::Go);
        let prefixes = Prefixes::collect(&[PrefixRule::GroupCall { method: "Group" }], &lexed.tokens);
        assert_eq!(prefixes.apply(Some("v1"), 0, "/users"), "/api/v1/users");
        assert_eq!(prefixes.apply(Some("r"), 0, "/ping"), "/ping");
    }

    #[test]
    fn test_constructor_prefix() {
        let src = "router = APIRouter(prefix=\"/items\", tags=[\"items\"])\n";
        let lexed = Lexer::tokenize(src, Language::Python);
        let prefixes = Prefixes::collect(
            &[PrefixRule::Constructor {
                name: "APIRouter",
                kwarg: "prefix",
            }],
            &lexed.tokens,
        );
        assert_eq!(prefixes.apply(Some("router"), 0, "/{id}"), "/items/{id}");
    }

    #[test]
    fn test_qualified_constructor() {
        let src = "bp = flask.Blueprint('users', __name__, url_prefix='/users')\n";
        let lexed = Lexer::tokenize(src, Language::Python);
        let prefixes = Prefixes::collect(
            &[PrefixRule::Constructor {
                name: "Blueprint",
                kwarg: "url_prefix",
            }],
            &lexed.tokens,
        );
        assert_eq!(prefixes.apply(Some("bp"), 0, "/"), "/users/");
    }

    #[test]
    fn test_laravel_groups_nest() {
        let src = r#"<?php
Route::prefix('api')->middleware('auth')->group(function () {
    Route::group(['prefix' => 'v1'], function () {
        Route::get('users', [UserController::class, 'index']);
    });
    Route::get('status', fn () => 'ok');
});
Route::get('home', fn () => 'home');
"#;
        let lexed = Lexer::tokenize(src, Language::Php);
        let prefixes = Prefixes::collect(&[PrefixRule::LaravelGroup], &lexed.tokens);

        let index_of = |text: &str| {
            lexed
                .tokens
                .iter()
                .position(|t| t.text == text)
                .unwrap()
        };
        assert_eq!(prefixes.apply(None, index_of("users"), "users"), "api/v1/users");
        assert_eq!(prefixes.apply(None, index_of("status"), "status"), "api/status");
        assert_eq!(prefixes.apply(None, index_of("home"), "home"), "home");
    }
}
