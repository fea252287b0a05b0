/// Liveness probe for the load balancer.
pub async fn health() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_returns_a_fixed_body() {
        assert_eq!(health().await, "OK");
    }
}
