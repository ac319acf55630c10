#[cfg(test)]
mod rewards_tests {
    use mockito::{Matcher, Server};
    use serde_json::json;

    use yoki_drops::error::AppError;
    use yoki_drops::export::{build_records, AmountRule, RewardRecord};
    use yoki_drops::rewards::{sign, RewardsClient};

    fn records() -> Vec<RewardRecord> {
        let addresses = vec![
            "0x515944479d05743df23e9a4cae5d5d28dd402ebb".to_string(),
            "0x00000000000000000000000000000000000000a1".to_string(),
        ];
        build_records(&addresses, 21, AmountRule::Pool(1_000), "Yoki2 season 7").unwrap()
    }

    #[tokio::test]
    async fn test_submit_sends_signed_headers_and_body() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("POST", "/acs/addDiscretionaryPointsBatch")
            .match_header("x-timestamp", Matcher::Regex(r"^\d{13}$".to_string()))
            .match_header("x-nonce", Matcher::Regex(r"^[0-9a-f]{32}$".to_string()))
            .match_header("x-signature", Matcher::Regex(r"^[0-9a-f]{64}$".to_string()))
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!([
                {
                    "userAddress": "0x515944479d05743df23e9a4cae5d5d28dd402ebb",
                    "defiId": 21,
                    "acsAmount": 500,
                    "description": "Yoki2 season 7"
                },
                {
                    "userAddress": "0x00000000000000000000000000000000000000a1",
                    "defiId": 21,
                    "acsAmount": 500,
                    "description": "Yoki2 season 7"
                }
            ])))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success": true, "inserted": 2}"#)
            .expect(1)
            .create_async()
            .await;

        let endpoint = format!("{}/acs/addDiscretionaryPointsBatch", server.url());
        let client = RewardsClient::new(reqwest::Client::new(), endpoint, "secret");
        let response = client.submit(&records()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response["inserted"], 2);
    }

    #[tokio::test]
    async fn test_rejected_batch_is_an_error() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("POST", "/")
            .with_status(401)
            .with_body("invalid signature")
            .expect(1)
            .create_async()
            .await;

        let client = RewardsClient::new(reqwest::Client::new(), server.url(), "wrong");
        let result = client.submit(&records()).await;

        mock.assert_async().await;
        match result {
            Err(AppError::Network(message)) => assert!(message.contains("invalid signature")),
            other => panic!("expected network error, got {:?}", other),
        }
    }

    #[test]
    fn test_signed_headers_verify_against_recomputed_signature() {
        let client = RewardsClient::new(reqwest::Client::new(), "http://localhost", "secret");
        let batch = records();
        let headers = client.sign_now(&batch).unwrap();

        let expected = sign(&batch, &headers.timestamp, &headers.nonce, "secret").unwrap();
        assert_eq!(headers.signature, expected);
        assert_ne!(sign(&batch, &headers.timestamp, &headers.nonce, "other").unwrap(), expected);
    }
}
