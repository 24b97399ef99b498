//! Tests for token exchange, refresh, caching and the loopback callback.

use chrono::{Duration, Utc};
use mockito::{Matcher, Server};
use photo_fetch::callback::CallbackListener;
use photo_fetch::{Authenticator, OAuthConfig, PhotosError, StoredToken, TokenStore, PICKER_SCOPE};
use serde_json::json;
use tempfile::TempDir;

fn config(token_uri: String) -> OAuthConfig {
    OAuthConfig {
        client_id: "client-123".to_string(),
        client_secret: "shh".to_string(),
        auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
        token_uri,
        scope: PICKER_SCOPE.to_string(),
    }
}

fn token(access_token: &str, expires_in_hours: i64, refresh_token: Option<&str>) -> StoredToken {
    StoredToken {
        access_token: access_token.to_string(),
        token_type: "Bearer".to_string(),
        refresh_token: refresh_token.map(str::to_string),
        expiry: Utc::now() + Duration::hours(expires_in_hours),
        scope: Some(PICKER_SCOPE.to_string()),
    }
}

fn token_body(access_token: &str, refresh_token: Option<&str>) -> String {
    let mut body = json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": 3599
    });
    if let Some(rt) = refresh_token {
        body["refresh_token"] = json!(rt);
    }
    body.to_string()
}

mod token_endpoint {
    use super::*;

    #[tokio::test]
    async fn test_exchange_code() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".to_string(), "authorization_code".to_string()),
                Matcher::UrlEncoded("code".to_string(), "4/0Adeu5".to_string()),
                Matcher::UrlEncoded("client_id".to_string(), "client-123".to_string()),
                Matcher::UrlEncoded(
                    "redirect_uri".to_string(),
                    "http://127.0.0.1:8080/".to_string(),
                ),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(token_body("ya29.fresh", Some("1//refresh")))
            .expect(1)
            .create_async()
            .await;

        let config = config(format!("{}/token", server.url()));
        let token = config
            .exchange_code(&reqwest::Client::new(), "4/0Adeu5", "http://127.0.0.1:8080/")
            .await
            .unwrap();

        assert_eq!(token.access_token, "ya29.fresh");
        assert_eq!(token.refresh_token.as_deref(), Some("1//refresh"));
        assert_eq!(token.scope.as_deref(), Some(PICKER_SCOPE));
        assert!(!token.is_expired());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_exchange_code_rejected() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error": "invalid_grant"}"#)
            .create_async()
            .await;

        let config = config(format!("{}/token", server.url()));
        let err = config
            .exchange_code(&reqwest::Client::new(), "stale", "http://127.0.0.1:8080/")
            .await
            .unwrap_err();

        assert!(matches!(err, PhotosError::AuthorizationError(_)));
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".to_string(), "refresh_token".to_string()),
                Matcher::UrlEncoded("refresh_token".to_string(), "1//keep".to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(token_body("ya29.renewed", None))
            .create_async()
            .await;

        let config = config(format!("{}/token", server.url()));
        let previous = token("ya29.old", -1, Some("1//keep"));
        let refreshed = config
            .refresh(&reqwest::Client::new(), &previous)
            .await
            .unwrap();

        assert_eq!(refreshed.access_token, "ya29.renewed");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("1//keep"));
        assert_eq!(refreshed.scope.as_deref(), Some(PICKER_SCOPE));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let config = config("http://127.0.0.1:9/token".to_string());
        let err = config
            .refresh(&reqwest::Client::new(), &token("ya29.old", -1, None))
            .await
            .unwrap_err();

        assert!(matches!(err, PhotosError::TokenRefreshError(_)));
    }
}

mod authenticator {
    use super::*;

    #[tokio::test]
    async fn test_valid_token_is_returned_without_refresh() {
        let mut server = Server::new_async().await;
        let mock = server.mock("POST", "/token").expect(0).create_async().await;

        let auth = Authenticator::with_token(
            config(format!("{}/token", server.url())),
            token("ya29.valid", 1, Some("1//r")),
            None,
        );

        assert_eq!(auth.get_access_token().await.unwrap(), "ya29.valid");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_saved() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(token_body("ya29.renewed", None))
            .expect(1)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));

        let auth = Authenticator::with_token(
            config(format!("{}/token", server.url())),
            token("ya29.old", -1, Some("1//r")),
            Some(store.clone()),
        );

        assert_eq!(auth.get_access_token().await.unwrap(), "ya29.renewed");
        // Second call uses the refreshed token.
        assert_eq!(auth.get_access_token().await.unwrap(), "ya29.renewed");

        let saved = store.load().unwrap().unwrap();
        assert_eq!(saved.access_token, "ya29.renewed");
        assert_eq!(saved.refresh_token.as_deref(), Some("1//r"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_succeeds_when_save_fails() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(token_body("ya29.renewed", None))
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        std::fs::create_dir(dir.path().join("token.json.tmp")).unwrap();

        let auth = Authenticator::with_token(
            config(format!("{}/token", server.url())),
            token("ya29.old", -1, Some("1//r")),
            Some(store.clone()),
        );

        assert_eq!(auth.get_access_token().await.unwrap(), "ya29.renewed");
        assert!(store.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_token_without_refresh_token_fails() {
        let auth = Authenticator::with_token(
            config("http://127.0.0.1:9/token".to_string()),
            token("ya29.old", -1, None),
            None,
        );

        let err = auth.get_access_token().await.unwrap_err();
        assert!(matches!(err, PhotosError::TokenRefreshError(_)));
    }
}

mod login {
    use super::*;

    #[tokio::test]
    async fn test_login_uses_cached_token() {
        let mut server = Server::new_async().await;
        let mock = server.mock("POST", "/token").expect(0).create_async().await;
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        store.save(&token("ya29.cached", 1, Some("1//r"))).unwrap();

        let auth = Authenticator::login(
            config(format!("{}/token", server.url())),
            store,
            "127.0.0.1:0".parse().unwrap(),
        )
        .await
        .unwrap();

        assert_eq!(auth.get_access_token().await.unwrap(), "ya29.cached");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_login_refreshes_expired_cached_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(Matcher::UrlEncoded(
                "grant_type".to_string(),
                "refresh_token".to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(token_body("ya29.renewed", Some("1//new")))
            .expect(1)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        store.save(&token("ya29.stale", -2, Some("1//old"))).unwrap();

        let auth = Authenticator::login(
            config(format!("{}/token", server.url())),
            store.clone(),
            "127.0.0.1:0".parse().unwrap(),
        )
        .await
        .unwrap();

        assert_eq!(auth.get_access_token().await.unwrap(), "ya29.renewed");
        let saved = store.load().unwrap().unwrap();
        assert_eq!(saved.refresh_token.as_deref(), Some("1//new"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_login_survives_unwritable_token_cache() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(token_body("ya29.renewed", None))
            .expect(1)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        let store = TokenStore::new(&path);
        store.save(&token("ya29.stale", -2, Some("1//old"))).unwrap();
        // A directory in the way of the temporary file makes every save fail.
        std::fs::create_dir(dir.path().join("token.json.tmp")).unwrap();

        let auth = Authenticator::login(
            config(format!("{}/token", server.url())),
            store.clone(),
            "127.0.0.1:0".parse().unwrap(),
        )
        .await
        .unwrap();

        assert_eq!(auth.get_access_token().await.unwrap(), "ya29.renewed");
        let cached = store.load().unwrap().unwrap();
        assert_eq!(cached.access_token, "ya29.stale");
        mock.assert_async().await;
    }
}

mod token_store {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_file_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("absent.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_saved_token_loads_back() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        let original = token("ya29.saved", 1, Some("1//r"));

        store.save(&original).unwrap();
        let loaded = store.load().unwrap().unwrap();

        assert_eq!(loaded.access_token, original.access_token);
        assert_eq!(loaded.refresh_token, original.refresh_token);
        assert_eq!(loaded.expiry.timestamp(), original.expiry.timestamp());
    }

    #[test]
    fn test_failed_save_keeps_previous_token() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        let store = TokenStore::new(&path);
        store.save(&token("ya29.first", 1, None)).unwrap();
        fs::create_dir(dir.path().join("token.json.tmp")).unwrap();

        assert!(store.save(&token("ya29.second", 1, None)).is_err());
        assert_eq!(store.load().unwrap().unwrap().access_token, "ya29.first");
    }

    #[test]
    fn test_save_leaves_no_temporary_file() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        store.save(&token("a", 1, None)).unwrap();
        store.save(&token("b", 1, None)).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec!["token.json"]);
        assert_eq!(store.load().unwrap().unwrap().access_token, "b");
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, "{not json").unwrap();

        assert!(TokenStore::new(&path).load().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_token_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        TokenStore::new(&path).save(&token("t", 1, None)).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

mod callback {
    use super::*;

    #[tokio::test]
    async fn test_callback_hands_over_code() {
        let listener = CallbackListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let redirect_uri = listener.redirect_uri();
        let waiter = tokio::spawn(async move { listener.wait_for_code("st4te").await });

        let response = reqwest::get(format!("{}?code=4%2Fabc&state=st4te&scope=x", redirect_uri))
            .await
            .unwrap();
        assert!(response.status().is_success());
        assert!(response.text().await.unwrap().contains("close this window"));

        let code = waiter.await.unwrap().unwrap();
        assert_eq!(code, "4/abc");
    }

    #[tokio::test]
    async fn test_callback_with_wrong_state() {
        let listener = CallbackListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let redirect_uri = listener.redirect_uri();
        let waiter = tokio::spawn(async move { listener.wait_for_code("expected").await });

        reqwest::get(format!("{}?code=abc&state=forged", redirect_uri))
            .await
            .unwrap();

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, PhotosError::StateMismatch));
    }

    #[tokio::test]
    async fn test_callback_with_access_denied() {
        let listener = CallbackListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let redirect_uri = listener.redirect_uri();
        let waiter = tokio::spawn(async move { listener.wait_for_code("s").await });

        reqwest::get(format!("{}?error=access_denied&state=s", redirect_uri))
            .await
            .unwrap();

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, PhotosError::AuthorizationError(_)));
    }
}
