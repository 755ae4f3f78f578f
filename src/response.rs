use serde::Serialize;

/// `{"status": "success", "token"?, "results"?, "data": ...}`
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<usize>,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success",
            token: None,
            results: None,
            data,
        }
    }

    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_results(mut self, results: usize) -> Self {
        self.results = Some(results);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_members_are_omitted() {
        let json = serde_json::to_value(Envelope::success(serde_json::json!({"a": 1}))).unwrap();
        assert_eq!(json, serde_json::json!({"status": "success", "data": {"a": 1}}));

        let json = serde_json::to_value(
            Envelope::success(Vec::<u8>::new())
                .with_token("t".into())
                .with_results(0),
        )
        .unwrap();
        assert_eq!(json["token"], "t");
        assert_eq!(json["results"], 0);
    }
}
