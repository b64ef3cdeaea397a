use bytes::Bytes;
use clubs_rust_rest::{
    CsrfSource, InstanceKey, KeyField, RequestBody, ResourceClient, RestError, UpdateMethod,
    UploadPart,
};
use serde_json::{json, Map, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn advisors_client(server: &MockServer) -> ResourceClient {
    ResourceClient::new(
        &format!("{}/api", server.uri()),
        "clubs/abc/advisors",
        reqwest::Client::new(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_list_bare_array() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/clubs/abc/advisors/"))
        .and(query_param("format", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "name": "Jane Doe" },
            { "id": 2, "name": "John Roe" }
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let advisors = advisors_client(&mock_server).list().await.unwrap();

    assert_eq!(advisors.len(), 2);
    assert_eq!(advisors[1].get("name"), Some(&json!("John Roe")));
}

#[tokio::test]
async fn test_list_paginated_envelope() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/clubs/"))
        .and(query_param("bypass", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 1,
            "next": null,
            "results": [{ "code": "pennlabs", "name": "Penn Labs" }]
        })))
        .mount(&mock_server)
        .await;

    let clubs = ResourceClient::new(
        &format!("{}/api", mock_server.uri()),
        "clubs",
        reqwest::Client::new(),
    )
    .unwrap()
    .with_key_field(KeyField::new("code"))
    .with_query("bypass", "true");

    let result = clubs.list().await.unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(
        result[0].key(clubs.key_field()),
        Some(InstanceKey::from("pennlabs"))
    );
}

#[tokio::test]
async fn test_create_sends_csrf_token() {
    let mock_server = MockServer::start().await;
    let advisor = json!({
        "name": "Jane Doe",
        "title": "Faculty Advisor",
        "email": "jane@example.edu"
    });

    Mock::given(method("POST"))
        .and(path("/api/clubs/abc/advisors/"))
        .and(header("X-CSRFToken", "token123"))
        .and(body_json(&advisor))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 1,
            "name": "Jane Doe",
            "title": "Faculty Advisor",
            "email": "jane@example.edu"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = advisors_client(&mock_server).with_csrf(CsrfSource::Token("token123".into()));
    let created = client.create(RequestBody::Json(advisor)).await.unwrap();

    assert_eq!(created.key(client.key_field()), Some(InstanceKey::Number(1)));
}

#[tokio::test]
async fn test_get_requests_skip_csrf() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/clubs/abc/advisors/1/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1 })))
        .mount(&mock_server)
        .await;

    let client = advisors_client(&mock_server).with_csrf(CsrfSource::Token("token123".into()));
    let advisor = client.retrieve(&InstanceKey::Number(1)).await.unwrap();
    assert_eq!(advisor.get("id"), Some(&json!(1)));

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0]
        .headers
        .iter()
        .any(|(name, _)| name.as_str().eq_ignore_ascii_case("x-csrftoken")));
}

#[tokio::test]
async fn test_update_uses_configured_method() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/clubs/abc/advisors/1/"))
        .and(body_json(json!({ "title": "Staff Advisor" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1, "name": "Jane Doe", "title": "Staff Advisor"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = advisors_client(&mock_server).with_update_method(UpdateMethod::Put);
    let updated = client
        .update(
            &InstanceKey::Number(1),
            RequestBody::Json(json!({ "title": "Staff Advisor" })),
        )
        .await
        .unwrap();

    assert_eq!(updated.get("title"), Some(&json!("Staff Advisor")));
}

#[tokio::test]
async fn test_delete_member_by_username() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/api/clubs/abc/members/jdoe/"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let members = ResourceClient::new(
        &format!("{}/api", mock_server.uri()),
        "clubs/abc/members",
        reqwest::Client::new(),
    )
    .unwrap()
    .with_key_field(KeyField::new("username"));

    let result = members.delete(&InstanceKey::from("jdoe")).await;
    assert!(result.is_ok(), "delete failed: {:?}", result.err());
}

#[tokio::test]
async fn test_rejection_body_is_structured() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/clubs/abc/advisors/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "email": ["Enter a valid email address."]
        })))
        .mount(&mock_server)
        .await;

    let result = advisors_client(&mock_server)
        .create(RequestBody::Json(json!({ "email": "nope" })))
        .await;

    match result {
        Err(RestError::Rejected { status, errors }) => {
            assert_eq!(status.as_u16(), 400);
            assert_eq!(
                errors.joined("email").as_deref(),
                Some("Enter a valid email address.")
            );
        }
        other => panic!("expected a rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_not_found_and_unparsed_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/clubs/abc/advisors/99/"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "detail": "Not found." })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/clubs/abc/advisors/"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
        .mount(&mock_server)
        .await;

    let client = advisors_client(&mock_server);

    let missing = client.retrieve(&InstanceKey::Number(99)).await;
    assert!(matches!(missing, Err(RestError::NotFound { .. })));

    let broken = client.list().await;
    match broken {
        Err(error @ RestError::UnparsedApiError { .. }) => {
            assert!(error.is_transport());
            assert_eq!(error.status().map(|s| s.as_u16()), Some(502));
        }
        other => panic!("expected an unparsed error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_multipart_upload() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/api/clubs/abc/events/7/"))
        .and(|request: &Request| {
            let body = String::from_utf8_lossy(&request.body);
            body.contains("name=\"image\"; filename=\"flyer.png\"")
                && body.contains("name=\"name\"")
                && body.contains("Spring Fair")
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7,
            "name": "Spring Fair",
            "image_url": "https://cdn.pennclubs.com/flyer.png"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let events = ResourceClient::new(
        &format!("{}/api", mock_server.uri()),
        "clubs/abc/events",
        reqwest::Client::new(),
    )
    .unwrap();

    let mut fields = Map::new();
    fields.insert("name".to_string(), Value::from("Spring Fair"));
    let body = RequestBody::Multipart {
        fields,
        files: vec![UploadPart {
            field: "image".to_string(),
            file_name: "flyer.png".to_string(),
            content_type: Some("image/png".to_string()),
            bytes: Bytes::from_static(&[0x89, 0x50, 0x4E, 0x47]),
        }],
    };

    let updated = events.update(&InstanceKey::Number(7), body).await.unwrap();
    assert_eq!(
        updated.get("image_url"),
        Some(&json!("https://cdn.pennclubs.com/flyer.png"))
    );
}

#[tokio::test]
async fn test_custom_action() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/clubs/abc/invites/5/resend/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let invites = ResourceClient::new(
        &format!("{}/api", mock_server.uri()),
        "clubs/abc/invites",
        reqwest::Client::new(),
    )
    .unwrap();

    let result = invites
        .action(&InstanceKey::Number(5), "resend", None)
        .await
        .unwrap();
    assert_eq!(result, json!({ "success": true }));
}

#[tokio::test]
async fn test_list_follows_next_page() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/clubs/"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 2,
            "next": null,
            "results": [{ "code": "chess", "name": "Chess Club" }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/clubs/"))
        .and(|request: &Request| !request.url.query_pairs().any(|(key, _)| key == "page"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 2,
            "next": format!("{}/api/clubs/?format=json&page=2", mock_server.uri()),
            "results": [{ "code": "pennlabs", "name": "Penn Labs" }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let clubs = ResourceClient::new(
        &format!("{}/api", mock_server.uri()),
        "clubs",
        reqwest::Client::new(),
    )
    .unwrap()
    .with_key_field(KeyField::new("code"));

    let result = clubs.list().await.unwrap();
    let codes: Vec<_> = result
        .iter()
        .filter_map(|club| club.key(clubs.key_field()))
        .collect();
    assert_eq!(
        codes,
        vec![InstanceKey::from("pennlabs"), InstanceKey::from("chess")]
    );
}

#[tokio::test]
async fn test_list_stops_on_repeated_next() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/clubs/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "next": format!("{}/api/clubs/?format=json&page=1", mock_server.uri()),
            "results": [{ "code": "pennlabs" }]
        })))
        .mount(&mock_server)
        .await;

    let clubs = ResourceClient::new(
        &format!("{}/api", mock_server.uri()),
        "clubs",
        reqwest::Client::new(),
    )
    .unwrap();

    let result = clubs.list().await;
    assert!(matches!(result, Err(RestError::DeserializationError(_))));
}

#[tokio::test]
async fn test_multipart_with_empty_list() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/api/clubs/abc/events/7/"))
        .and(body_json(json!({ "name": "Fair", "tags": [] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7,
            "name": "Fair",
            "tags": []
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/api/clubs/abc/events/7/"))
        .and(|request: &Request| {
            let body = String::from_utf8_lossy(&request.body);
            body.contains("filename=\"flyer.png\"") && !body.contains("name=\"tags\"")
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7,
            "name": "Fair",
            "tags": [],
            "image_url": "https://cdn.pennclubs.com/flyer.png"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let events = ResourceClient::new(
        &format!("{}/api", mock_server.uri()),
        "clubs/abc/events",
        reqwest::Client::new(),
    )
    .unwrap();

    let mut fields = Map::new();
    fields.insert("name".to_string(), Value::from("Fair"));
    fields.insert("tags".to_string(), json!([]));
    let body = RequestBody::Multipart {
        fields,
        files: vec![UploadPart {
            field: "image".to_string(),
            file_name: "flyer.png".to_string(),
            content_type: Some("image/png".to_string()),
            bytes: Bytes::from_static(&[0x89, 0x50, 0x4E, 0x47]),
        }],
    };

    let updated = events.update(&InstanceKey::Number(7), body).await.unwrap();
    assert_eq!(updated.get("tags"), Some(&json!([])));
    assert_eq!(
        updated.get("image_url"),
        Some(&json!("https://cdn.pennclubs.com/flyer.png"))
    );
}
