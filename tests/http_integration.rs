//! Integration tests for the JSON-protocol HTTP client using wiremock
//!
//! These tests verify the HTTP client behavior against mocked endpoints,
//! ensuring proper handling of various response codes and edge cases.

use cloudinv::provider::http::{format_api_error, HttpClientFactory};
use cloudinv::provider::{AccessDenialClassifier, AwsAccessDenial, ClientFactory, Region, StaticRegions};
use cloudinv::{ApiClient, FieldValue, InventoryError, Session};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn factory(server: &MockServer) -> HttpClientFactory {
    HttpClientFactory::new(Some(&server.uri())).expect("valid endpoint")
}

/// Test module for HTTP client integration tests
mod http_client_tests {
    use super::*;

    /// Test successful call sends the target header and returns parsed JSON
    #[tokio::test]
    async fn test_success_returns_json() {
        let server = MockServer::start().await;

        let expected_response = json!({
            "logGroups": [
                {"logGroupName": "app", "arn": "arn:aws:logs:us-east-1:1:log-group:app"}
            ]
        });

        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("X-Amz-Target", "Logs_20140328.DescribeLogGroups"))
            .and(header("Content-Type", "application/x-amz-json-1.1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&expected_response))
            .expect(1)
            .mount(&server)
            .await;

        let client = factory(&server)
            .client("logs", Some(&Region::from("us-east-1")))
            .unwrap();
        let response = client
            .call("DescribeLogGroups", &json!({}))
            .await
            .expect("Request should succeed");

        assert_eq!(response["logGroups"][0]["logGroupName"], "app");
    }

    /// Test services on the 1.0 protocol get the matching content type
    #[tokio::test]
    async fn test_json_version_follows_service() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(header("X-Amz-Target", "GraniteServiceVersion20100801.DescribeAlarms"))
            .and(header("Content-Type", "application/x-amz-json-1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"MetricAlarms": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = factory(&server)
            .client("monitoring", Some(&Region::from("eu-west-1")))
            .unwrap();
        let response = client.call("DescribeAlarms", &json!({})).await.unwrap();
        assert_eq!(response, json!({"MetricAlarms": []}));
    }

    /// Test 400 AccessDeniedException is classified as an access denial
    #[tokio::test]
    async fn test_access_denied_is_classified() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "__type": "com.amazonaws.logs#AccessDeniedException",
                "message": "User is not authorized to perform logs:DescribeLogGroups"
            })))
            .mount(&server)
            .await;

        let client = factory(&server)
            .client("logs", Some(&Region::from("ap-east-1")))
            .unwrap();
        let err = client.call("DescribeLogGroups", &json!({})).await.unwrap_err();

        assert_eq!(err.status, Some(400));
        assert_eq!(err.code, "AccessDeniedException");
        assert_eq!(err.region, "ap-east-1");
        assert!(AwsAccessDenial.is_access_denied(&err));
    }

    /// Test 500 response is a hard error
    #[tokio::test]
    async fn test_500_is_not_a_denial() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .mount(&server)
            .await;

        let client = factory(&server)
            .client("kms", Some(&Region::from("us-east-1")))
            .unwrap();
        let err = client.call("ListKeys", &json!({})).await.unwrap_err();

        assert_eq!(err.status, Some(500));
        assert_eq!(err.code, "UnknownError");
        assert!(!AwsAccessDenial.is_access_denied(&err));

        let message = format_api_error(&InventoryError::Api(err));
        assert!(message.contains("temporarily unavailable"));
    }

    /// Test empty response body is handled gracefully
    #[tokio::test]
    async fn test_empty_response_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = factory(&server).client("route53", None).unwrap();
        let response = client.call("GetDNSSEC", &json!({"HostedZoneId": "Z1"})).await.unwrap();
        assert_eq!(response, json!({}));
    }

    /// Test unparseable success body is a malformed response
    #[tokio::test]
    async fn test_malformed_json() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .mount(&server)
            .await;

        let client = factory(&server)
            .client("kms", Some(&Region::from("us-east-1")))
            .unwrap();
        let err = client.call("ListKeys", &json!({})).await.unwrap_err();
        assert_eq!(err.code, "MalformedResponse");
    }

    /// Test unknown services are rejected before any request
    #[tokio::test]
    async fn test_unknown_service() {
        let server = MockServer::start().await;
        let err = factory(&server).client("nope", None).err().unwrap();
        assert!(matches!(err, InventoryError::Config(_)));
    }
}

/// Session tests against the mocked HTTP endpoint
mod http_session_tests {
    use super::*;

    /// Test pagination, references and lookups over HTTP
    #[tokio::test]
    async fn test_log_groups_over_http() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(header("X-Amz-Target", "Logs_20140328.DescribeLogGroups"))
            .and(body_json(json!({})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "logGroups": [{"arn": "arn:lg:a", "logGroupName": "a"}],
                "nextToken": "t1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(header("X-Amz-Target", "Logs_20140328.DescribeLogGroups"))
            .and(body_json(json!({"nextToken": "t1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "logGroups": [{
                    "arn": "arn:lg:b",
                    "logGroupName": "b",
                    "kmsKeyId": "arn:aws:kms:us-east-1:1:key/k1"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = Session::new(
            Arc::new(StaticRegions::new(["us-east-1"])),
            Arc::new(factory(&server)),
        );

        let groups = session.fetch_all("aws.cloudwatch.loggroup").await.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].str_field("name"), Some("a"));
        assert!(groups[0].field("kmsKey").unwrap().is_nil());
        assert_eq!(
            groups[1].field("kmsKey"),
            Some(&FieldValue::Ref(cloudinv::NodeRef::new(
                "aws.kms.key",
                "arn:aws:kms:us-east-1:1:key/k1"
            )))
        );

        let by_name = session
            .lookup_by_attribute("aws.cloudwatch.loggroup", "name", &json!("b"))
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&by_name, &groups[1]));
    }
}
