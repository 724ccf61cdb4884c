use async_trait::async_trait;
use tc_core::AdminAuth;

/// Authorizes every caller. Used when no admin credential is configured,
/// which leaves manual unlock available as a testing override.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAdmin;

#[async_trait]
impl AdminAuth for OpenAdmin {
    async fn authorize(&self, _token: Option<&str>) -> bool {
        true
    }

    fn is_open(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_guard_authorizes_everyone_and_reports_itself_open() {
        assert!(OpenAdmin.authorize(None).await);
        assert!(OpenAdmin.authorize(Some("anything")).await);
        assert!(OpenAdmin.is_open());
    }
}
