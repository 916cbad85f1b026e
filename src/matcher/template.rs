//! Route-shape templates.
//!
//! A template is an ordered list of [`Tok`]s. Literal tokens must match
//! exactly; placeholder tokens capture the receiver, HTTP method, path,
//! handler and any method chain hanging off the declaration.

use super::lexer::{Token, TokenKind};

const LOWER_VERBS: &[&str] = &["get", "post", "put", "patch", "delete", "head", "options"];
const UPPER_VERBS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// How far a definition may sit below its decorator or attribute
const DEFINITION_LOOKAHEAD: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbCase {
    Lower,
    Upper,
    /// Only the extra names are accepted
    None,
}

#[derive(Debug, Clone, Copy)]
pub struct MethodRule {
    pub case: VerbCase,
    pub extras: &'static [&'static str],
}

impl MethodRule {
    pub fn accepts(&self, text: &str) -> bool {
        let verb = match self.case {
            VerbCase::Lower => LOWER_VERBS.contains(&text),
            VerbCase::Upper => UPPER_VERBS.contains(&text),
            VerbCase::None => false,
        };
        verb || self.extras.contains(&text)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ReceiverRule {
    Any,
    Named(&'static [&'static str]),
    Except(&'static [&'static str]),
}

impl ReceiverRule {
    fn accepts(&self, name: &str) -> bool {
        match self {
            ReceiverRule::Any => true,
            ReceiverRule::Named(names) => names.contains(&name),
            ReceiverRule::Except(names) => !names.contains(&name),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PathRule {
    /// Reject literals that do not start with `/` (or are not `*`)
    pub require_slash: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ArgsRule {
    /// Positional arguments required after the path
    pub min_args: usize,
    /// Read `methods=[...]` / `method="..."` keyword arguments
    pub methods_kwarg: bool,
    /// Take the handler from the last positional argument
    pub handler: bool,
    /// Reject the match when the last argument is an object literal
    pub reject_object_handler: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum Tok {
    Word(&'static str),
    Sym(char),
    Receiver(ReceiverRule),
    Method(MethodRule),
    /// `['get', 'post']`
    MethodList,
    Path(PathRule),
    /// Remaining call arguments through the closing `)`
    Args(ArgsRule),
    /// One or more `.verb(handler)` calls
    Chain(MethodRule),
    /// Method-router expression up to the enclosing `)`, e.g.
    /// `get(list).post(create)` or `web::get().to(list)`
    CallChain(MethodRule),
    /// Zero or more `name(...)->` calls
    SkipCalls,
    /// Name of the next `def`/`fn`/`function`
    Definition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEntry {
    pub method: String,
    pub handler: Option<String>,
    pub token: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capture {
    pub start: usize,
    pub end: usize,
    pub receiver: Option<String>,
    pub method: Option<String>,
    pub method_list: Vec<String>,
    pub path: Option<String>,
    pub handler: Option<String>,
    pub chain: Vec<ChainEntry>,
    pub definition: Option<String>,
}

/// One route declared by a capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRoute {
    pub method: String,
    pub handler: Option<String>,
    pub token: usize,
}

impl Capture {
    pub fn routes(&self) -> Vec<CapturedRoute> {
        if !self.chain.is_empty() {
            return self
                .chain
                .iter()
                .map(|entry| CapturedRoute {
                    method: entry.method.clone(),
                    handler: entry.handler.clone(),
                    token: entry.token,
                })
                .collect();
        }

        let handler = self.definition.clone().or_else(|| self.handler.clone());
        let methods: Vec<String> = if self.method_list.is_empty() {
            self.method.iter().cloned().collect()
        } else {
            self.method_list.clone()
        };
        methods
            .into_iter()
            .map(|method| CapturedRoute {
                method,
                handler: handler.clone(),
                token: self.start,
            })
            .collect()
    }
}

/// Tries to match `template` with its first token at `tokens[start]`.
pub fn match_at(template: &[Tok], tokens: &[Token], start: usize) -> Option<Capture> {
    let mut capture = Capture {
        start,
        ..Capture::default()
    };
    let end = match_seq(template, tokens, start, &mut capture)?;
    capture.end = end;
    Some(capture)
}

fn match_seq(template: &[Tok], tokens: &[Token], mut pos: usize, cap: &mut Capture) -> Option<usize> {
    for (ti, tok) in template.iter().enumerate() {
        if let Tok::SkipCalls = tok {
            let rest = &template[ti + 1..];
            let mut cursor = pos;
            loop {
                let mut attempt = cap.clone();
                if let Some(end) = match_seq(rest, tokens, cursor, &mut attempt) {
                    *cap = attempt;
                    return Some(end);
                }
                cursor = skip_arrow_call(tokens, cursor)?;
            }
        }
        pos = match_one(tok, tokens, pos, cap)?;
    }
    Some(pos)
}

fn match_one(tok: &Tok, tokens: &[Token], pos: usize, cap: &mut Capture) -> Option<usize> {
    let current = tokens.get(pos)?;
    match tok {
        Tok::Word(word) => current.is_ident(word).then_some(pos + 1),
        Tok::Sym(c) => current.is_punct(*c).then_some(pos + 1),
        Tok::Receiver(rule) => {
            if current.kind != TokenKind::Ident || !rule.accepts(&current.text) {
                return None;
            }
            cap.receiver = Some(current.text.clone());
            Some(pos + 1)
        }
        Tok::Method(rule) => {
            if current.kind != TokenKind::Ident || !rule.accepts(&current.text) {
                return None;
            }
            cap.method = Some(current.text.clone());
            Some(pos + 1)
        }
        Tok::MethodList => {
            if !current.is_punct('[') {
                return None;
            }
            let close = matching_close(tokens, pos)?;
            let methods: Vec<String> = tokens[pos + 1..close]
                .iter()
                .filter(|t| t.kind == TokenKind::Str)
                .map(|t| t.text.clone())
                .collect();
            if methods.is_empty() {
                return None;
            }
            cap.method_list = methods;
            Some(close + 1)
        }
        Tok::Path(rule) => {
            if current.kind != TokenKind::Str {
                return None;
            }
            let path = current.text.trim();
            if rule.require_slash && !(path.starts_with('/') || path == "*") {
                return None;
            }
            cap.path = Some(path.to_string());
            Some(pos + 1)
        }
        Tok::Args(rule) => match_args(rule, tokens, pos, cap),
        Tok::Chain(rule) => match_chain(rule, tokens, pos, cap),
        Tok::CallChain(rule) => match_call_chain(rule, tokens, pos, cap),
        // Expanded in match_seq
        Tok::SkipCalls => Some(pos),
        Tok::Definition => {
            let limit = (pos + DEFINITION_LOOKAHEAD).min(tokens.len());
            for i in pos..limit {
                let t = &tokens[i];
                if t.is_ident("class") || t.is_ident("struct") {
                    return None;
                }
                if t.is_ident("def") || t.is_ident("fn") || t.is_ident("function") {
                    let name = tokens.get(i + 1).filter(|n| n.kind == TokenKind::Ident)?;
                    cap.definition = Some(name.text.clone());
                    return Some(i + 2);
                }
            }
            None
        }
    }
}

/// Arguments after the path: `)` directly, or `, arg, arg )`.
fn match_args(rule: &ArgsRule, tokens: &[Token], pos: usize, cap: &mut Capture) -> Option<usize> {
    let current = tokens.get(pos)?;
    if current.is_punct(')') {
        return (rule.min_args == 0).then_some(pos + 1);
    }
    if !current.is_punct(',') {
        return None;
    }

    let (args, close) = split_args(tokens, pos + 1)?;
    let (keyword, positional): (Vec<_>, Vec<_>) = args
        .into_iter()
        .partition(|range| is_keyword_arg(&tokens[range.0..range.1]));
    if positional.len() < rule.min_args {
        return None;
    }

    if rule.methods_kwarg {
        for range in &keyword {
            let arg = &tokens[range.0..range.1];
            if arg[0].is_ident("methods") || arg[0].is_ident("method") {
                cap.method_list.extend(
                    arg[2..]
                        .iter()
                        .filter(|t| t.kind == TokenKind::Str)
                        .map(|t| t.text.clone()),
                );
            }
        }
    }

    if let Some(last) = positional.last() {
        let arg = &tokens[last.0..last.1];
        if rule.reject_object_handler && arg.first().map(|t| t.is_punct('{')) == Some(true) {
            return None;
        }
        if rule.handler {
            cap.handler = handler_name(arg);
        }
    }
    Some(close + 1)
}

fn match_chain(rule: &MethodRule, tokens: &[Token], mut pos: usize, cap: &mut Capture) -> Option<usize> {
    loop {
        let is_call = tokens.get(pos).map(|t| t.is_punct('.')) == Some(true)
            && tokens
                .get(pos + 1)
                .map(|t| t.kind == TokenKind::Ident && rule.accepts(&t.text))
                == Some(true)
            && tokens.get(pos + 2).map(|t| t.is_punct('(')) == Some(true);
        if !is_call {
            break;
        }
        let open = pos + 2;
        let close = matching_close(tokens, open)?;
        let (args, _) = split_args(tokens, open + 1)?;
        let handler = args.last().and_then(|r| handler_name(&tokens[r.0..r.1]));
        cap.chain.push(ChainEntry {
            method: tokens[pos + 1].text.clone(),
            handler,
            token: pos + 1,
        });
        pos = close + 1;
    }
    (!cap.chain.is_empty()).then_some(pos)
}

fn match_call_chain(
    rule: &MethodRule,
    tokens: &[Token],
    pos: usize,
    cap: &mut Capture,
) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = pos;
    while let Some(t) = tokens.get(i) {
        if t.kind == TokenKind::Punct {
            match t.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => {
                    if depth == 0 {
                        return (!cap.chain.is_empty()).then_some(i + 1);
                    }
                    depth -= 1;
                }
                _ => {}
            }
            i += 1;
            continue;
        }

        let is_verb_call = depth == 0
            && t.kind == TokenKind::Ident
            && rule.accepts(&t.text)
            && tokens.get(i + 1).map(|n| n.is_punct('(')) == Some(true);
        if !is_verb_call {
            i += 1;
            continue;
        }

        let close = matching_close(tokens, i + 1)?;
        let inner = &tokens[i + 2..close];
        let handler = if inner.is_empty() {
            // web::get().to(handler)
            let to_call = tokens.get(close + 1).map(|t| t.is_punct('.')) == Some(true)
                && tokens.get(close + 2).map(|t| t.is_ident("to")) == Some(true)
                && tokens.get(close + 3).map(|t| t.is_punct('(')) == Some(true);
            if to_call {
                let to_close = matching_close(tokens, close + 3)?;
                handler_name(&tokens[close + 4..to_close])
            } else {
                None
            }
        } else {
            handler_name(inner)
        };
        cap.chain.push(ChainEntry {
            method: t.text.clone(),
            handler,
            token: i,
        });
        i = close + 1;
    }
    None
}

/// `name(...)->` starting at `pos`; returns the index after `->`.
fn skip_arrow_call(tokens: &[Token], pos: usize) -> Option<usize> {
    if tokens.get(pos)?.kind != TokenKind::Ident || !tokens.get(pos + 1)?.is_punct('(') {
        return None;
    }
    let close = matching_close(tokens, pos + 1)?;
    (tokens.get(close + 1)?.is_punct('-') && tokens.get(close + 2)?.is_punct('>')).then_some(close + 3)
}

/// Index of the bracket closing the one at `open`.
pub fn matching_close(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, t) in tokens.iter().enumerate().skip(open) {
        if t.kind != TokenKind::Punct {
            continue;
        }
        match t.text.as_str() {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits top-level arguments from `from` up to the `)` closing the call.
/// Returns half-open token ranges and the index of that `)`.
pub fn split_args(tokens: &[Token], from: usize) -> Option<(Vec<(usize, usize)>, usize)> {
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut arg_start = from;
    for (i, t) in tokens.iter().enumerate().skip(from) {
        if t.kind != TokenKind::Punct {
            continue;
        }
        match t.text.as_str() {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" if depth > 0 => depth -= 1,
            ")" => {
                if arg_start < i {
                    args.push((arg_start, i));
                }
                return Some((args, i));
            }
            "," if depth == 0 => {
                if arg_start < i {
                    args.push((arg_start, i));
                }
                arg_start = i + 1;
            }
            _ => {}
        }
    }
    None
}

/// `name=value` (Python, Rust attributes). `==` and `=>` are not keywords.
fn is_keyword_arg(arg: &[Token]) -> bool {
    arg.len() >= 3
        && arg[0].kind == TokenKind::Ident
        && arg[1].is_punct('=')
        && !arg[2].is_punct('=')
        && !arg[2].is_punct('>')
}

/// Statically visible handler name in an argument, if any.
pub fn handler_name(arg: &[Token]) -> Option<String> {
    let first = arg.first()?;

    // [UserController::class, 'index']
    if first.is_punct('[') {
        let class_at = arg.windows(3).position(|w| {
            w[0].is_punct(':') && w[1].is_punct(':') && w[2].is_ident("class")
        })?;
        let controller = arg[..class_at]
            .iter()
            .rev()
            .find(|t| t.kind == TokenKind::Ident)?;
        let action = arg.iter().find(|t| t.kind == TokenKind::Str)?;
        return Some(format!("{}@{}", controller.text, action.text));
    }

    // 'UserController@index'
    if arg.len() == 1 && first.kind == TokenKind::Str {
        return first.text.contains('@').then(|| first.text.clone());
    }

    // name, a.b.c, a::b, \App\Http\Controllers\UserController::class
    let arg = if first.is_punct('\\') { &arg[1..] } else { arg };
    let mut name = String::new();
    let mut expect_ident = true;
    let mut i = 0;
    while i < arg.len() {
        let t = &arg[i];
        if expect_ident {
            if t.kind != TokenKind::Ident {
                return None;
            }
            name.push_str(&t.text);
            expect_ident = false;
            i += 1;
        } else if t.is_punct('.') || t.is_punct('\\') {
            name.push_str(&t.text);
            expect_ident = true;
            i += 1;
        } else if t.is_punct(':') && arg.get(i + 1).map(|n| n.is_punct(':')) == Some(true) {
            name.push_str("::");
            expect_ident = true;
            i += 2;
        } else {
            return None;
        }
    }
    (!expect_ident && !is_keyword(&name)).then_some(name)
}

fn is_keyword(name: &str) -> bool {
    matches!(
        name,
        "function" | "async" | "fn" | "move" | "lambda" | "null" | "None" | "true" | "false"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frameworks::Language;
    use crate::matcher::lexer::Lexer;

    const LOWER: MethodRule = MethodRule {
        case: VerbCase::Lower,
        extras: &["all"],
    };

    const CALL: &[Tok] = &[
        Tok::Receiver(ReceiverRule::Named(&["app"])),
        Tok::Sym('.'),
        Tok::Method(LOWER),
        Tok::Sym('('),
        Tok::Path(PathRule { require_slash: true }),
        Tok::Args(ArgsRule {
            min_args: 1,
            methods_kwarg: false,
            handler: true,
            reject_object_handler: true,
        }),
    ];

    fn find_all(template: &[Tok], src: &str, language: Language) -> Vec<Capture> {
        let lexed = Lexer::tokenize(src, language);
        (0..lexed.tokens.len())
            .filter_map(|i| match_at(template, &lexed.tokens, i))
            .collect()
    }

    #[test]
    fn test_match_simple_call() {
        let caps = find_all(CALL, "app.get('/users', listUsers);", Language::JavaScript);
        assert_eq!(caps.len(), 1);
        assert_eq!(caps[0].method.as_deref(), Some("get"));
        assert_eq!(caps[0].path.as_deref(), Some("/users"));
        assert_eq!(caps[0].handler.as_deref(), Some("listUsers"));
        assert_eq!(caps[0].receiver.as_deref(), Some("app"));
    }

    #[test]
    fn test_match_requires_handler_argument() {
        let caps = find_all(CALL, "const env = app.get('/env');", Language::JavaScript);
        assert!(caps.is_empty());
    }

    #[test]
    fn test_match_rejects_object_handler() {
        let caps = find_all(CALL, "app.get('/users', { params });", Language::JavaScript);
        assert!(caps.is_empty());
    }

    #[test]
    fn test_inline_handler_has_no_name() {
        let src = "app.post('/users', auth, async (req, res) => { res.send(1) });";
        let caps = find_all(CALL, src, Language::JavaScript);
        assert_eq!(caps.len(), 1);
        assert_eq!(caps[0].handler, None);
    }

    #[test]
    fn test_dotted_handler() {
        let caps = find_all(CALL, "app.delete('/u/:id', users.remove)", Language::JavaScript);
        assert_eq!(caps[0].handler.as_deref(), Some("users.remove"));
    }

    #[test]
    fn test_methods_kwarg() {
        const DECORATOR: &[Tok] = &[
            Tok::Sym('@'),
            Tok::Receiver(ReceiverRule::Any),
            Tok::Sym('.'),
            Tok::Method(MethodRule {
                case: VerbCase::Lower,
                extras: &["route"],
            }),
            Tok::Sym('('),
            Tok::Path(PathRule {
                require_slash: false,
            }),
            Tok::Args(ArgsRule {
                min_args: 0,
                methods_kwarg: true,
                handler: false,
                reject_object_handler: false,
            }),
            Tok::Definition,
        ];
        let src = "@bp.route('/items', methods=['GET', 'POST'])\ndef items():\n    pass\n";
        let caps = find_all(DECORATOR, src, Language::Python);
        assert_eq!(caps.len(), 1);
        let routes = caps[0].routes();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].method, "GET");
        assert_eq!(routes[1].method, "POST");
        assert_eq!(routes[0].handler.as_deref(), Some("items"));
    }

    #[test]
    fn test_chain() {
        const ROUTE: &[Tok] = &[
            Tok::Receiver(ReceiverRule::Any),
            Tok::Sym('.'),
            Tok::Word("route"),
            Tok::Sym('('),
            Tok::Path(PathRule { require_slash: true }),
            Tok::Sym(')'),
            Tok::Chain(LOWER),
        ];
        let src = "router.route('/books').get(list).post(auth, create);";
        let caps = find_all(ROUTE, src, Language::JavaScript);
        let routes = caps[0].routes();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].method, "get");
        assert_eq!(routes[0].handler.as_deref(), Some("list"));
        assert_eq!(routes[1].handler.as_deref(), Some("create"));
    }

    #[test]
    fn test_call_chain_axum_and_actix() {
        const ROUTE: &[Tok] = &[
            Tok::Sym('.'),
            Tok::Word("route"),
            Tok::Sym('('),
            Tok::Path(PathRule { require_slash: true }),
            Tok::Sym(','),
            Tok::CallChain(MethodRule {
                case: VerbCase::Lower,
                extras: &["any"],
            }),
        ];
        let src = r#"Router::new()
            .route("/users", get(list_users).post(handlers::create_user))
            .route("/health", web::get().to(health))
            .route("/x", routing::delete(|| async { "" }).layer(cors()))"#;
        let caps = find_all(ROUTE, src, Language::Rust);
        assert_eq!(caps.len(), 3);

        let users = caps[0].routes();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].handler.as_deref(), Some("list_users"));
        assert_eq!(users[1].method, "post");
        assert_eq!(users[1].handler.as_deref(), Some("handlers::create_user"));

        let health = caps[1].routes();
        assert_eq!(health[0].method, "get");
        assert_eq!(health[0].handler.as_deref(), Some("health"));

        let x = caps[2].routes();
        assert_eq!(x.len(), 1);
        assert_eq!(x[0].method, "delete");
        assert_eq!(x[0].handler, None);
    }

    #[test]
    fn test_skip_calls_and_laravel_handlers() {
        const ROUTE: &[Tok] = &[
            Tok::Word("Route"),
            Tok::Sym(':'),
            Tok::Sym(':'),
            Tok::SkipCalls,
            Tok::Method(MethodRule {
                case: VerbCase::Lower,
                extras: &["any"],
            }),
            Tok::Sym('('),
            Tok::Path(PathRule {
                require_slash: false,
            }),
            Tok::Args(ArgsRule {
                min_args: 1,
                methods_kwarg: false,
                handler: true,
                reject_object_handler: false,
            }),
        ];
        let src = "Route::middleware('auth')->post('/login', [AuthController::class, 'login'])->name('login');\n\
                   Route::get('users', 'UserController@index');";
        let caps = find_all(ROUTE, src, Language::Php);
        assert_eq!(caps.len(), 2);
        assert_eq!(caps[0].method.as_deref(), Some("post"));
        assert_eq!(caps[0].handler.as_deref(), Some("AuthController@login"));
        assert_eq!(caps[1].path.as_deref(), Some("users"));
        assert_eq!(caps[1].handler.as_deref(), Some("UserController@index"));
    }

    #[test]
    fn test_method_list() {
        const MATCH: &[Tok] = &[
            Tok::Word("Route"),
            Tok::Sym(':'),
            Tok::Sym(':'),
            Tok::Word("match"),
            Tok::Sym('('),
            Tok::MethodList,
            Tok::Sym(','),
            Tok::Path(PathRule {
                require_slash: false,
            }),
            Tok::Args(ArgsRule {
                min_args: 1,
                methods_kwarg: false,
                handler: true,
                reject_object_handler: false,
            }),
        ];
        let caps = find_all(
            MATCH,
            "Route::match(['get', 'post'], '/form', [FormController::class, 'handle']);",
            Language::Php,
        );
        let routes = caps[0].routes();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[1].method, "post");
        assert_eq!(routes[1].handler.as_deref(), Some("FormController@handle"));
    }

    #[test]
    fn test_definition_lookahead_stops_at_class() {
        const DECORATED: &[Tok] = &[
            Tok::Sym('@'),
            Tok::Word("app"),
            Tok::Sym('.'),
            Tok::Word("get"),
            Tok::Sym('('),
            Tok::Path(PathRule {
                require_slash: false,
            }),
            Tok::Sym(')'),
            Tok::Definition,
        ];
        let src = "@app.get('/x')\nclass View:\n    def get(self): pass\n";
        assert!(find_all(DECORATED, src, Language::Python).is_empty());
    }

    #[test]
    fn test_matching_close_and_split_args() {
        let lexed = Lexer::tokenize("f(a, g(b, c), [d, e])", Language::JavaScript);
        let close = matching_close(&lexed.tokens, 1).unwrap();
        assert_eq!(close, lexed.tokens.len() - 1);
        let (args, end) = split_args(&lexed.tokens, 2).unwrap();
        assert_eq!(args.len(), 3);
        assert_eq!(end, close);
    }
}
