use hv_utils::{query, QueryMap};
use std::time::Duration;

use crate::constants::{PARAM_LIMIT, PARAM_LOCATION, PARAM_QUERY, PARAM_TIMEOUT, PARAM_USE_CACHE};
use crate::gateway::DispatchRequest;

/// Query-string access for incoming requests.
pub(super) trait HttpRequest {
    /// Decodes the query string. The first value of a repeated key wins.
    fn query_params(&self) -> QueryMap;

    /// Reads the search parameters. Missing text fields stay empty, so the
    /// gateway reports them; an unparsable limit falls back to the default.
    fn dispatch_request(&self) -> DispatchRequest {
        let params = self.query_params();

        DispatchRequest {
            query: params.get(PARAM_QUERY).unwrap_or_default().to_string(),
            location: params.get(PARAM_LOCATION).unwrap_or_default().to_string(),
            limit: params.parse(PARAM_LIMIT),
            use_cache: params.flag(PARAM_USE_CACHE, true),
            timeout: params
                .parse::<u64>(PARAM_TIMEOUT)
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }
}

impl<B> HttpRequest for hyper::Request<B> {
    #[inline]
    fn query_params(&self) -> QueryMap {
        let query = self.uri().query().unwrap_or_default();
        query::from_bytes(query.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> hyper::Request<()> {
        hyper::Request::builder().uri(uri).body(()).unwrap()
    }

    #[test]
    fn test_dispatch_request_from_query() {
        let parsed = request("/search?query=pizza+place&location=Boston%2C%20MA&limit=20&use_cache=false")
            .dispatch_request();

        assert_eq!(
            parsed,
            DispatchRequest::new("pizza place", "Boston, MA")
                .limit(20)
                .use_cache(false)
        );
    }

    #[test]
    fn test_defaults_when_absent_or_invalid() {
        let parsed = request("/search?query=pizza&limit=lots").dispatch_request();

        assert_eq!(parsed.location, "");
        assert_eq!(parsed.limit, None);
        assert!(parsed.use_cache);
        assert_eq!(parsed.timeout, None);
    }

    #[test]
    fn test_timeout_in_seconds() {
        let parsed = request("/search?query=a&location=b&timeout=7").dispatch_request();
        assert_eq!(parsed.timeout, Some(Duration::from_secs(7)));
    }
}
