use serde::{Deserialize, Serialize};

/// `{success, error?, data?}` response envelope returned by every gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> GatewayResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            error: None,
            data: Some(data),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn into_result(self) -> Result<T, String> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (_, _) => Err(self
                .error
                .unwrap_or_else(|| String::from("response carried no data"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn failure_omits_data_field() {
        let response: GatewayResponse<u32> =
            GatewayResponse::failure("Missing required parameters: city");
        let value = serde_json::to_value(&response).expect("serializes");

        assert_eq!(
            value,
            json!({"success": false, "error": "Missing required parameters: city"})
        );
    }

    #[test]
    fn success_omits_error_field() {
        let value = serde_json::to_value(GatewayResponse::ok(7_u32)).expect("serializes");
        assert_eq!(value, json!({"success": true, "data": 7}));
    }

    #[test]
    fn payload_without_default_impl_deserializes() {
        #[derive(Debug, PartialEq, Deserialize)]
        struct Report {
            suburb: String,
        }

        let parsed: GatewayResponse<Report> =
            serde_json::from_str(r#"{"success":true,"data":{"suburb":"Ponsonby"}}"#)
                .expect("parses");
        assert_eq!(parsed.data.map(|report| report.suburb).as_deref(), Some("Ponsonby"));

        let failed: GatewayResponse<Report> =
            serde_json::from_str(r#"{"success":false,"error":"boom"}"#).expect("parses");
        assert!(failed.data.is_none());
    }

    #[test]
    fn into_result_surfaces_error_text() {
        let response: GatewayResponse<u32> = GatewayResponse::failure("boom");
        assert_eq!(response.into_result(), Err(String::from("boom")));
    }
}
