use tonic::Request;

/// Client ip for observers and audit rows: first `x-forwarded-for` hop,
/// then `x-real-ip`, then the transport peer.
pub fn client_ip<T>(request: &Request<T>) -> String {
  let metadata = request.metadata();

  if let Some(forwarded) = metadata.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
    if let Some(first) = forwarded
      .split(',')
      .next()
      .map(str::trim)
      .filter(|hop| !hop.is_empty())
    {
      return first.to_string();
    }
  }

  if let Some(real) = metadata
    .get("x-real-ip")
    .and_then(|v| v.to_str().ok())
    .map(str::trim)
    .filter(|ip| !ip.is_empty())
  {
    return real.to_string();
  }

  request
    .remote_addr()
    .map(|addr| addr.ip().to_string())
    .unwrap_or_default()
}

pub fn bearer_token<T>(request: &Request<T>) -> Option<String> {
  let value = request.metadata().get("authorization")?.to_str().ok()?;

  value
    .strip_prefix("Bearer ")
    .or_else(|| value.strip_prefix("bearer "))
    .map(|token| token.trim().to_string())
    .filter(|token| !token.is_empty())
}

pub fn user_agent<T>(request: &Request<T>) -> String {
  request
    .metadata()
    .get("user-agent")
    .and_then(|v| v.to_str().ok())
    .unwrap_or_default()
    .to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn request_with(pairs: &[(&'static str, &str)]) -> Request<()> {
    let mut request = Request::new(());
    for (key, value) in pairs {
      request.metadata_mut().insert(*key, value.parse().unwrap());
    }
    request
  }

  #[test]
  fn forwarded_for_takes_the_first_hop() {
    let request = request_with(&[
      ("x-forwarded-for", "1.2.3.4, 10.0.0.1"),
      ("x-real-ip", "9.9.9.9"),
    ]);
    assert_eq!(client_ip(&request), "1.2.3.4");
  }

  #[test]
  fn real_ip_is_the_fallback() {
    let request = request_with(&[("x-real-ip", "9.9.9.9")]);
    assert_eq!(client_ip(&request), "9.9.9.9");
  }

  #[test]
  fn bearer_parsing() {
    let request = request_with(&[("authorization", "Bearer 12|abcdef")]);
    assert_eq!(bearer_token(&request).as_deref(), Some("12|abcdef"));

    let request = request_with(&[("authorization", "Basic xyz")]);
    assert_eq!(bearer_token(&request), None);

    let request = request_with(&[]);
    assert_eq!(bearer_token(&request), None);
  }
}
