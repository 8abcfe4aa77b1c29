use actix_web::{web, HttpRequest};
use std::collections::HashMap;
use url::form_urlencoded;

/// Parses a URL-encoded form body. Fails only when the body is not UTF-8;
/// repeated keys keep the last value.
pub fn parse_form(form_bytes: &web::Bytes) -> Result<HashMap<String, String>, std::str::Utf8Error> {
    let body = std::str::from_utf8(form_bytes)?;
    Ok(form_urlencoded::parse(body.as_bytes()).into_owned().collect())
}

/// True for requests issued by htmx, which expect an HTML fragment.
pub fn is_htmx(req: &HttpRequest) -> bool {
    req.headers()
        .get("HX-Request")
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v.eq_ignore_ascii_case("true"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn form_fields_are_decoded() {
        let body = web::Bytes::from_static(b"author_name=Ann+Lee&content=k8s%20%26%20go&parent_id=");
        let fields = parse_form(&body).unwrap();
        assert_eq!(fields["author_name"], "Ann Lee");
        assert_eq!(fields["content"], "k8s & go");
        assert_eq!(fields["parent_id"], "");
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        assert!(parse_form(&web::Bytes::from_static(&[0xff, 0xfe])).is_err());
    }

    #[test]
    fn htmx_header_is_detected() {
        assert!(is_htmx(&TestRequest::default().insert_header(("HX-Request", "true")).to_http_request()));
        assert!(!is_htmx(&TestRequest::default().to_http_request()));
    }
}
