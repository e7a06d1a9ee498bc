// Query string parsing for the relay endpoint

use std::borrow::Cow;

use crate::error::RelayError;

/// The transform request carried in the endpoint's query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRequest {
    pub src: String,
    pub token: String,
}

/// Parses the raw query string of a relay request.
///
/// `src` must be present exactly once; a repeated `src` is treated the
/// same as a missing one since the request no longer names a single
/// object. `params` carries the opaque transform token, is optional and
/// defaults to empty. Values are percent-decoded; `+` is not treated as
/// a space.
pub fn parse_transform_request(query: Option<&str>) -> Result<TransformRequest, RelayError> {
    let query = query.unwrap_or("");

    let mut src: Option<String> = None;
    let mut token: Option<String> = None;

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (name, value) = match pair.split_once('=') {
            Some((n, v)) => (n, v),
            None => (pair, ""),
        };
        match name {
            "src" => {
                if src.is_some() {
                    return Err(RelayError::InvalidSource(
                        "src parameter given more than once".to_string(),
                    ));
                }
                src = Some(decode(value));
            }
            "params" => {
                if token.is_none() {
                    token = Some(decode(value));
                }
            }
            _ => {}
        }
    }

    let src = src.ok_or_else(|| {
        RelayError::InvalidSource("src parameter is required".to_string())
    })?;

    Ok(TransformRequest {
        src,
        token: token.unwrap_or_default(),
    })
}

fn decode(value: &str) -> String {
    match urlencoding::decode(value) {
        Ok(Cow::Borrowed(s)) => s.to_string(),
        Ok(Cow::Owned(s)) => s,
        // Invalid UTF-8 after decoding; keep the raw text and let the
        // source grammar reject it downstream.
        Err(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_src_and_token() {
        let req = parse_transform_request(Some("src=bucket%2Fimg.png&params=w:300")).unwrap();
        assert_eq!(req.src, "bucket/img.png");
        assert_eq!(req.token, "w:300");
    }

    #[test]
    fn test_token_defaults_to_empty() {
        let req = parse_transform_request(Some("src=bucket/img.png")).unwrap();
        assert_eq!(req.src, "bucket/img.png");
        assert_eq!(req.token, "");
    }

    #[test]
    fn test_missing_src_is_rejected() {
        assert!(parse_transform_request(Some("params=w:300")).is_err());
        assert!(parse_transform_request(Some("")).is_err());
        assert!(parse_transform_request(None).is_err());
    }

    #[test]
    fn test_repeated_src_is_rejected() {
        let err = parse_transform_request(Some("src=a/bb&src=c/dd")).unwrap_err();
        assert!(matches!(err, RelayError::InvalidSource(_)));
    }

    #[test]
    fn test_unknown_parameters_are_ignored() {
        let req = parse_transform_request(Some("w=300&src=bucket/img.png&v=2")).unwrap();
        assert_eq!(req.src, "bucket/img.png");
    }

    #[test]
    fn test_plus_is_not_a_space() {
        let req = parse_transform_request(Some("src=bucket/a+b.png")).unwrap();
        assert_eq!(req.src, "bucket/a+b.png");
    }

    #[test]
    fn test_valueless_pair() {
        let req = parse_transform_request(Some("src=bucket/img.png&params")).unwrap();
        assert_eq!(req.token, "");
    }
}
