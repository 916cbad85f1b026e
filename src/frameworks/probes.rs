//! Code-pattern probes: framework idioms searched for in representative files.

use once_cell::sync::Lazy;
use regex::Regex;

use super::Framework;

struct Probe {
    framework: Framework,
    idiom: &'static str,
    regex: Regex,
}

fn probe(framework: Framework, idiom: &'static str, pattern: &str) -> Probe {
    Probe {
        framework,
        idiom,
        regex: Regex::new(pattern).expect("invalid probe pattern"),
    }
}

static PROBES: Lazy<Vec<Probe>> = Lazy::new(|| {
    vec![
        probe(
            Framework::Express,
            "express import",
            r#"require\(\s*['"]express['"]\s*\)|from\s+['"]express['"]"#,
        ),
        probe(Framework::Express, "express app", r"\bexpress\s*\(\s*\)|\bexpress\.Router\s*\("),
        probe(
            Framework::NextJs,
            "next server import",
            r#"from\s+['"]next/server['"]|\bNextResponse\b|\bNextApiRequest\b|\bNextApiResponse\b"#,
        ),
        probe(Framework::FastApi, "fastapi import", r"(?m)from\s+fastapi\s+import|^\s*import\s+fastapi"),
        probe(Framework::FastApi, "fastapi app", r"\bFastAPI\s*\(|\bAPIRouter\s*\("),
        probe(Framework::Flask, "flask import", r"(?m)from\s+flask\s+import|^\s*import\s+flask"),
        probe(Framework::Flask, "flask app", r"\bFlask\s*\(\s*__name__|\bBlueprint\s*\("),
        probe(
            Framework::Laravel,
            "route facade",
            r"\bRoute::(get|post|put|patch|delete|any|match|resource|apiResource|group|prefix|middleware)\s*\(",
        ),
        probe(Framework::Laravel, "illuminate import", r"\buse\s+Illuminate\\"),
        probe(Framework::Gin, "gin import", r#""github\.com/gin-gonic/gin""#),
        probe(Framework::Gin, "gin engine", r"\bgin\.(Default|New)\s*\(\s*\)"),
        probe(Framework::Axum, "axum import", r"\buse\s+axum\b|\baxum::"),
        probe(
            Framework::Actix,
            "actix import",
            r"\buse\s+actix_web\b|\bactix_web::|\bHttpServer::new\b",
        ),
    ]
});

/// Runs every probe of `framework` against `content`, returning the first
/// matching idiom.
pub fn probe_content(framework: Framework, content: &str) -> Option<&'static str> {
    PROBES
        .iter()
        .filter(|p| p.framework == framework)
        .find(|p| p.regex.is_match(content))
        .map(|p| p.idiom)
}

/// Ranks a file for probing: conventional entry points first, then shallow
/// paths. Lower sorts earlier.
pub fn entry_rank(relative: &std::path::Path) -> (u8, usize) {
    const ENTRY_STEMS: &[&str] = &["app", "server", "index", "main", "routes", "api", "web"];
    let stem = relative
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let is_entry = ENTRY_STEMS.contains(&stem);
    (u8::from(!is_entry), relative.components().count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_probe_express() {
        let src = "const express = require('express');\nconst app = express();\n";
        assert_eq!(probe_content(Framework::Express, src), Some("express import"));
    }

    #[test]
    fn test_probe_fastapi_app_only() {
        let src = "app = FastAPI()\n";
        assert_eq!(probe_content(Framework::FastApi, src), Some("fastapi app"));
        assert_eq!(probe_content(Framework::Flask, src), None);
    }

    #[test]
    fn test_probe_flask() {
        let src = "from flask import Flask\napp = Flask(__name__)\n";
        assert!(probe_content(Framework::Flask, src).is_some());
    }

    #[test]
    fn test_probe_laravel_and_gin() {
        assert!(probe_content(Framework::Laravel, "Route::get('/x', fn() => 1);").is_some());
        assert!(probe_content(Framework::Gin, "r := gin.Default()").is_some());
        assert!(probe_content(Framework::Gin, "r := mux.NewRouter()").is_none());
    }

    #[test]
    fn test_probe_rust_frameworks() {
        assert!(probe_content(Framework::Axum, "use axum::{routing::get, Router};").is_some());
        assert!(probe_content(Framework::Actix, "use actix_web::{get, App};").is_some());
        assert!(probe_content(Framework::Axum, "use actix_web::App;").is_none());
    }

    #[test]
    fn test_entry_rank_prefers_entry_points() {
        assert!(entry_rank(Path::new("src/server.js")) < entry_rank(Path::new("a.js")));
        assert!(entry_rank(Path::new("app.js")) < entry_rank(Path::new("src/app.js")));
    }
}
