macro_rules! constant_strings {
    (
        $(
            $(#[$docs:meta])*
            ($name_upcase:ident, $value:expr),
        )+
    ) => {
        $(
            $(#[$docs])*
            #[allow(dead_code)]
            pub const $name_upcase: &'static str = $value;
        )+
    }
}

constant_strings! {
    (SERVICE_NAME, "harvester"),

    // HTTP RESPONSE
    (NOT_FOUND, "Not Found"),
    (METHOD_NOT_ALLOWED, "Method Not Allowed"),
    (CONTENT_TYPE_JSON, "application/json"),

    // HEALTH
    (HEALTHY, "healthy"),
    (UNHEALTHY, "unhealthy"),

    // QUERY PARAMETERS
    (PARAM_QUERY, "query"),
    (PARAM_LOCATION, "location"),
    (PARAM_LIMIT, "limit"),
    (PARAM_USE_CACHE, "use_cache"),
    /// Per-request dispatch timeout in seconds.
    (PARAM_TIMEOUT, "timeout"),
}

/// Routes served by the HTTP gateway, as listed by the index.
pub const ENDPOINTS: &[&str] = &[
    "GET /",
    "GET /health",
    "GET /stats",
    "GET /workers",
    "GET /search?query=&location=&limit=&use_cache=",
    "POST /cache/clear",
];
