use reqwest::RequestBuilder;

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Credentials attached to every outgoing request.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum Auth {
    #[default]
    None,
    Bearer(String),
    ApiKey(String),
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::None => f.write_str("None"),
            Auth::Bearer(_) => f.write_str("Bearer(***)"),
            Auth::ApiKey(_) => f.write_str("ApiKey(***)"),
        }
    }
}

impl Auth {
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Auth::None => request,
            Auth::Bearer(token) => request.bearer_auth(token),
            Auth::ApiKey(key) => request.header(API_KEY_HEADER, key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers() {
        let client = reqwest::Client::new();
        let bearer = Auth::Bearer("t0k".into())
            .apply(client.get("http://localhost/"))
            .build()
            .unwrap();
        assert_eq!(bearer.headers()["authorization"], "Bearer t0k");

        let key = Auth::ApiKey("k3y".into())
            .apply(client.get("http://localhost/"))
            .build()
            .unwrap();
        assert_eq!(key.headers()["x-api-key"], "k3y");

        let none = Auth::None.apply(client.get("http://localhost/")).build().unwrap();
        assert!(none.headers().is_empty());
    }

    #[test]
    fn debug_hides_secrets() {
        assert_eq!(format!("{:?}", Auth::Bearer("secret".into())), "Bearer(***)");
    }
}
