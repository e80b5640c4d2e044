//! Python web-framework classification.
//!
//! Classes are tagged from their base classes, functions from their
//! decorators. Route handlers also get the HTTP method and path.

use std::sync::OnceLock;

use codesense_core::HttpRoute;
use regex::Regex;

pub const DJANGO_MODEL: &str = "django_model";
pub const DJANGO_VIEW: &str = "django_view";
pub const DJANGO_SERIALIZER: &str = "django_serializer";
pub const PYDANTIC_MODEL: &str = "pydantic_model";
pub const FLASK_BLUEPRINT: &str = "flask_blueprint";
pub const FASTAPI_ROUTE: &str = "fastapi_route";
pub const FLASK_ROUTE: &str = "flask_route";

/// Every tag this module can emit.
pub const ALL_TAGS: &[&str] = &[
    DJANGO_MODEL,
    DJANGO_VIEW,
    DJANGO_SERIALIZER,
    PYDANTIC_MODEL,
    FLASK_BLUEPRINT,
    FASTAPI_ROUTE,
    FLASK_ROUTE,
];

const DJANGO_MODEL_BASES: &[&str] = &["models.Model", "Model", "AbstractUser", "AbstractBaseUser"];

// Matched as substrings of the base expression.
const DJANGO_VIEW_BASES: &[&str] = &[
    "APIView",
    "ViewSet",
    "ModelViewSet",
    "ReadOnlyModelViewSet",
    "GenericViewSet",
    "View",
    "ListView",
    "DetailView",
    "CreateView",
    "UpdateView",
    "DeleteView",
    "TemplateView",
];

const DJANGO_SERIALIZER_BASES: &[&str] = &[
    "serializers.Serializer",
    "serializers.ModelSerializer",
    "Serializer",
    "ModelSerializer",
    "HyperlinkedModelSerializer",
];

const PYDANTIC_BASES: &[&str] = &["BaseModel", "pydantic.BaseModel"];

const FLASK_BLUEPRINT_BASES: &[&str] = &["Blueprint"];

const DJANGO_VIEW_DECORATORS: &[&str] = &[
    "api_view",
    "login_required",
    "permission_required",
    "require_http_methods",
    "require_GET",
    "require_POST",
];

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn fastapi_route_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(
        &RE,
        r#"(?:app|router)\.(get|post|put|delete|patch|options|head)\(\s*["']([^"']+)"#,
    )
}

fn flask_route_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&RE, r#"(?:app|blueprint|\w+)\.route\(\s*["']([^"']+)"#)
}

fn methods_list_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&RE, r#"methods\s*=\s*\[([^\]]+)\]"#)
}

fn quoted_word_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&RE, r#"["']([A-Za-z]+)["']"#)
}

/// Tag a class from its base-class expressions.
///
/// # Examples
///
/// ```
/// use codesense_lens::framework::classify_class;
///
/// assert_eq!(classify_class(&["models.Model".to_string()]), Some("django_model"));
/// assert_eq!(classify_class(&["BaseModel".to_string()]), Some("pydantic_model"));
/// assert_eq!(classify_class(&["object".to_string()]), None);
/// ```
pub fn classify_class(bases: &[String]) -> Option<&'static str> {
    let bases: Vec<&str> = bases.iter().map(|b| b.trim()).collect();
    let exact = |names: &[&str]| bases.iter().any(|b| names.contains(b));

    if exact(DJANGO_MODEL_BASES) {
        Some(DJANGO_MODEL)
    } else if bases
        .iter()
        .any(|b| DJANGO_VIEW_BASES.iter().any(|v| b.contains(v)))
    {
        Some(DJANGO_VIEW)
    } else if exact(DJANGO_SERIALIZER_BASES) {
        Some(DJANGO_SERIALIZER)
    } else if exact(PYDANTIC_BASES) {
        Some(PYDANTIC_MODEL)
    } else if exact(FLASK_BLUEPRINT_BASES) {
        Some(FLASK_BLUEPRINT)
    } else {
        None
    }
}

/// Tag a function from its decorator texts (without `@`).
///
/// # Examples
///
/// ```
/// use codesense_lens::framework::classify_function;
///
/// let (tag, route) = classify_function(&["router.post(\"/items\")".to_string()]).unwrap();
/// assert_eq!(tag, "fastapi_route");
/// let route = route.unwrap();
/// assert_eq!(route.method, "POST");
/// assert_eq!(route.path.as_deref(), Some("/items"));
/// ```
pub fn classify_function(decorators: &[String]) -> Option<(&'static str, Option<HttpRoute>)> {
    for decorator in decorators {
        if let Some(caps) = fastapi_route_re().and_then(|re| re.captures(decorator)) {
            return Some((
                FASTAPI_ROUTE,
                Some(HttpRoute {
                    method: caps[1].to_uppercase(),
                    path: Some(caps[2].to_string()),
                }),
            ));
        }

        if let Some(caps) = flask_route_re().and_then(|re| re.captures(decorator)) {
            let method = methods_list_re()
                .and_then(|re| re.captures(decorator))
                .and_then(|m| first_quoted_word(&m[1]))
                .unwrap_or_else(|| "GET".to_string());
            return Some((
                FLASK_ROUTE,
                Some(HttpRoute {
                    method,
                    path: Some(caps[1].to_string()),
                }),
            ));
        }

        if DJANGO_VIEW_DECORATORS.iter().any(|d| decorator.contains(d)) {
            let method = if decorator.contains("require_GET") {
                Some("GET".to_string())
            } else if decorator.contains("require_POST") {
                Some("POST".to_string())
            } else {
                first_quoted_word(decorator)
            };
            return Some((
                DJANGO_VIEW,
                method.map(|method| HttpRoute { method, path: None }),
            ));
        }
    }
    None
}

fn first_quoted_word(text: &str) -> Option<String> {
    quoted_word_re()
        .and_then(|re| re.captures(text))
        .map(|caps| caps[1].to_uppercase())
}
