use crate::api::types::User;
use crate::cache::ResourceCache;
use crate::mutation::MutationExecutor;

/// What every view needs to read and write library data.
#[derive(Clone)]
pub struct AppContext {
  pub cache: ResourceCache,
  pub mutations: MutationExecutor,
  pub user: Option<User>,
  /// Page size for the "my borrows" list
  pub borrow_page_size: u32,
}

impl AppContext {
  pub fn username(&self) -> Option<&str> {
    self.user.as_ref().map(|u| u.username.as_str())
  }

  pub fn is_admin(&self) -> bool {
    self.user.as_ref().is_some_and(|u| u.is_admin())
  }
}
