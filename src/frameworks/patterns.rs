//! Declarative route patterns, one set per framework.
//!
//! Patterns are data: adding a framework means adding a [`PatternSet`] here
//! plus its markers in [`super::Framework`], with no matcher changes.

use std::path::Path;

use glob::{MatchOptions, Pattern};

use crate::matcher::convention::ConventionKind;
use crate::matcher::prefix::PrefixRule;
use crate::matcher::template::{
    ArgsRule, MethodRule, PathRule, ReceiverRule, Tok, VerbCase,
};

use super::Framework;

#[derive(Debug, Clone, Copy)]
pub enum PatternKind {
    /// One route (or a method chain) per template match
    Template(&'static [Tok]),
    /// A resource declaration expanded into the conventional action set
    Resource(&'static [Tok]),
    /// Path and methods derived from the file's location and exports
    Convention(ConventionKind),
}

#[derive(Debug, Clone, Copy)]
pub struct RoutePattern {
    pub name: &'static str,
    pub kind: PatternKind,
    /// Globs relative to the scan root; empty means every file
    pub file_globs: &'static [&'static str],
    pub extensions: &'static [&'static str],
    pub base_confidence: f64,
}

impl RoutePattern {
    pub fn applies_to(&self, relative: &Path) -> bool {
        let ext = relative
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        if !self.extensions.contains(&ext) {
            return false;
        }
        if self.file_globs.is_empty() {
            return true;
        }
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        self.file_globs.iter().any(|glob| {
            Pattern::new(glob)
                .map(|p| p.matches_path_with(relative, options))
                .unwrap_or(false)
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PatternSet {
    pub patterns: &'static [RoutePattern],
    pub prefixes: &'static [PrefixRule],
}

pub fn pattern_set(framework: Framework) -> &'static PatternSet {
    match framework {
        Framework::Express => &EXPRESS,
        Framework::NextJs => &NEXTJS,
        Framework::FastApi => &FASTAPI,
        Framework::Flask => &FLASK,
        Framework::Laravel => &LARAVEL,
        Framework::Gin => &GIN,
        Framework::Axum => &AXUM,
        Framework::Actix => &ACTIX,
    }
}

const JS: &[&str] = &["js", "mjs", "cjs", "jsx", "ts", "tsx"];
const PY: &[&str] = &["py"];
const PHP: &[&str] = &["php"];
const GO: &[&str] = &["go"];
const RS: &[&str] = &["rs"];

const LOWER_VERBS: MethodRule = MethodRule {
    case: VerbCase::Lower,
    extras: &[],
};

const SLASH_PATH: Tok = Tok::Path(PathRule {
    require_slash: true,
});
const ANY_PATH: Tok = Tok::Path(PathRule {
    require_slash: false,
});

const HANDLER_ARGS: Tok = Tok::Args(ArgsRule {
    min_args: 1,
    methods_kwarg: false,
    handler: true,
    reject_object_handler: false,
});

const DECORATOR_ARGS: Tok = Tok::Args(ArgsRule {
    min_args: 0,
    methods_kwarg: true,
    handler: false,
    reject_object_handler: false,
});

// Express

const EXPRESS_VERBS: MethodRule = MethodRule {
    case: VerbCase::Lower,
    extras: &["all"],
};

const EXPRESS_HANDLER_ARGS: Tok = Tok::Args(ArgsRule {
    min_args: 1,
    methods_kwarg: false,
    handler: true,
    reject_object_handler: true,
});

/// Receivers that are HTTP clients, caches or collections, never routers
const EXPRESS_NON_ROUTERS: &[&str] = &[
    "app",
    "server",
    "axios",
    "http",
    "https",
    "fetch",
    "client",
    "request",
    "req",
    "res",
    "superagent",
    "supertest",
    "agent",
    "ky",
    "got",
    "$",
    "jQuery",
    "cy",
    "cache",
    "map",
    "params",
    "headers",
    "searchParams",
    "redis",
    "db",
    "knex",
    "store",
    "localStorage",
    "sessionStorage",
    "config",
    "Object",
    "Reflect",
    "window",
    "document",
    "console",
    "JSON",
    "Math",
];

static EXPRESS: PatternSet = PatternSet {
    patterns: &[
        RoutePattern {
            name: "express.app",
            kind: PatternKind::Template(&[
                Tok::Receiver(ReceiverRule::Named(&["app", "server"])),
                Tok::Sym('.'),
                Tok::Method(EXPRESS_VERBS),
                Tok::Sym('('),
                SLASH_PATH,
                EXPRESS_HANDLER_ARGS,
            ]),
            file_globs: &[],
            extensions: JS,
            base_confidence: 0.95,
        },
        RoutePattern {
            name: "express.router",
            kind: PatternKind::Template(&[
                Tok::Receiver(ReceiverRule::Except(EXPRESS_NON_ROUTERS)),
                Tok::Sym('.'),
                Tok::Method(EXPRESS_VERBS),
                Tok::Sym('('),
                SLASH_PATH,
                EXPRESS_HANDLER_ARGS,
            ]),
            file_globs: &[],
            extensions: JS,
            base_confidence: 0.85,
        },
        RoutePattern {
            name: "express.route_chain",
            kind: PatternKind::Template(&[
                Tok::Receiver(ReceiverRule::Any),
                Tok::Sym('.'),
                Tok::Word("route"),
                Tok::Sym('('),
                SLASH_PATH,
                Tok::Sym(')'),
                Tok::Chain(EXPRESS_VERBS),
            ]),
            file_globs: &[],
            extensions: JS,
            base_confidence: 0.9,
        },
    ],
    prefixes: &[],
};

// Next.js

static NEXTJS: PatternSet = PatternSet {
    patterns: &[
        RoutePattern {
            name: "nextjs.pages_api",
            kind: PatternKind::Convention(ConventionKind::PagesApi),
            file_globs: &["pages/api/**/*", "src/pages/api/**/*"],
            extensions: JS,
            base_confidence: 0.9,
        },
        RoutePattern {
            name: "nextjs.app_router",
            kind: PatternKind::Convention(ConventionKind::AppRouter),
            file_globs: &["app/**/route.*", "src/app/**/route.*"],
            extensions: JS,
            base_confidence: 0.95,
        },
    ],
    prefixes: &[],
};

// FastAPI and Flask

static FASTAPI: PatternSet = PatternSet {
    patterns: &[RoutePattern {
        name: "fastapi.decorator",
        kind: PatternKind::Template(&[
            Tok::Sym('@'),
            Tok::Receiver(ReceiverRule::Any),
            Tok::Sym('.'),
            Tok::Method(MethodRule {
                case: VerbCase::Lower,
                extras: &["api_route"],
            }),
            Tok::Sym('('),
            ANY_PATH,
            DECORATOR_ARGS,
            Tok::Definition,
        ]),
        file_globs: &[],
        extensions: PY,
        base_confidence: 0.95,
    }],
    prefixes: &[PrefixRule::Constructor {
        name: "APIRouter",
        kwarg: "prefix",
    }],
};

static FLASK: PatternSet = PatternSet {
    patterns: &[RoutePattern {
        name: "flask.decorator",
        kind: PatternKind::Template(&[
            Tok::Sym('@'),
            Tok::Receiver(ReceiverRule::Any),
            Tok::Sym('.'),
            Tok::Method(MethodRule {
                case: VerbCase::Lower,
                extras: &["route"],
            }),
            Tok::Sym('('),
            ANY_PATH,
            DECORATOR_ARGS,
            Tok::Definition,
        ]),
        file_globs: &[],
        extensions: PY,
        base_confidence: 0.95,
    }],
    prefixes: &[PrefixRule::Constructor {
        name: "Blueprint",
        kwarg: "url_prefix",
    }],
};

// Laravel

static LARAVEL: PatternSet = PatternSet {
    patterns: &[
        RoutePattern {
            name: "laravel.route",
            kind: PatternKind::Template(&[
                Tok::Word("Route"),
                Tok::Sym(':'),
                Tok::Sym(':'),
                Tok::SkipCalls,
                Tok::Method(MethodRule {
                    case: VerbCase::Lower,
                    extras: &["any"],
                }),
                Tok::Sym('('),
                ANY_PATH,
                HANDLER_ARGS,
            ]),
            file_globs: &[],
            extensions: PHP,
            base_confidence: 0.95,
        },
        RoutePattern {
            name: "laravel.match",
            kind: PatternKind::Template(&[
                Tok::Word("Route"),
                Tok::Sym(':'),
                Tok::Sym(':'),
                Tok::SkipCalls,
                Tok::Word("match"),
                Tok::Sym('('),
                Tok::MethodList,
                Tok::Sym(','),
                ANY_PATH,
                HANDLER_ARGS,
            ]),
            file_globs: &[],
            extensions: PHP,
            base_confidence: 0.95,
        },
        RoutePattern {
            name: "laravel.resource",
            kind: PatternKind::Resource(&[
                Tok::Word("Route"),
                Tok::Sym(':'),
                Tok::Sym(':'),
                Tok::SkipCalls,
                Tok::Method(MethodRule {
                    case: VerbCase::None,
                    extras: &["resource", "apiResource"],
                }),
                Tok::Sym('('),
                ANY_PATH,
                HANDLER_ARGS,
            ]),
            file_globs: &[],
            extensions: PHP,
            base_confidence: 0.9,
        },
    ],
    prefixes: &[PrefixRule::LaravelGroup],
};

// Gin

static GIN: PatternSet = PatternSet {
    patterns: &[RoutePattern {
        name: "gin.route",
        kind: PatternKind::Template(&[
            Tok::Receiver(ReceiverRule::Except(&["http", "c", "ctx", "client"])),
            Tok::Sym('.'),
            Tok::Method(MethodRule {
                case: VerbCase::Upper,
                extras: &["Any"],
            }),
            Tok::Sym('('),
            SLASH_PATH,
            HANDLER_ARGS,
        ]),
        file_globs: &[],
        extensions: GO,
        base_confidence: 0.9,
    }],
    prefixes: &[PrefixRule::GroupCall { method: "Group" }],
};

// Axum and Actix

const METHOD_ROUTER: &[Tok] = &[
    Tok::Sym('.'),
    Tok::Word("route"),
    Tok::Sym('('),
    SLASH_PATH,
    Tok::Sym(','),
    Tok::CallChain(LOWER_VERBS),
];

static AXUM: PatternSet = PatternSet {
    patterns: &[RoutePattern {
        name: "axum.route",
        kind: PatternKind::Template(METHOD_ROUTER),
        file_globs: &[],
        extensions: RS,
        base_confidence: 0.9,
    }],
    prefixes: &[],
};

static ACTIX: PatternSet = PatternSet {
    patterns: &[
        RoutePattern {
            name: "actix.attribute",
            kind: PatternKind::Template(&[
                Tok::Sym('#'),
                Tok::Sym('['),
                Tok::Method(MethodRule {
                    case: VerbCase::Lower,
                    extras: &["route"],
                }),
                Tok::Sym('('),
                SLASH_PATH,
                DECORATOR_ARGS,
                Tok::Sym(']'),
                Tok::Definition,
            ]),
            file_globs: &[],
            extensions: RS,
            base_confidence: 0.95,
        },
        RoutePattern {
            name: "actix.route",
            kind: PatternKind::Template(METHOD_ROUTER),
            file_globs: &[],
            extensions: RS,
            base_confidence: 0.85,
        },
    ],
    prefixes: &[],
};
