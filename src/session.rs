//! Who is signed in, and the credential requests go out with.

use serde_json::Value;
use tracing::{info, warn};

use crate::api::types::{AuthResponse, User};
use crate::api::Credentials;
use crate::cache::ResourceCache;
use crate::config::Config;
use crate::error::ApiError;
use crate::forms::{LoginForm, RegisterForm};
use crate::mutation::{MutationArgs, MutationExecutor, LOGIN, REGISTER};

pub struct Session {
  credentials: Credentials,
  user: Option<User>,
  /// Shown in the header, e.g. a failed start-up login
  notice: Option<String>,
}

impl Session {
  pub fn new(credentials: Credentials) -> Self {
    Self {
      credentials,
      user: None,
      notice: None,
    }
  }

  /// Sign in from the environment: BOOKLEND_TOKEN if set, otherwise a login
  /// with `api.username` and BOOKLEND_PASSWORD. Failures leave the session
  /// unauthenticated with a notice.
  pub async fn start(config: &Config, credentials: Credentials, executor: &MutationExecutor) -> Self {
    Self::start_with(
      credentials,
      executor,
      Config::get_api_token(),
      config.api.username.clone(),
      Config::get_password(),
    )
    .await
  }

  async fn start_with(
    credentials: Credentials,
    executor: &MutationExecutor,
    token: Option<String>,
    username: Option<String>,
    password: Option<String>,
  ) -> Self {
    let mut session = Self::new(credentials);

    if let Some(token) = token {
      info!("using bearer token from environment");
      session.credentials.set(token);
      // The API has no "who am I" endpoint, so all we know is the name
      session.user = username.map(|username| User {
        username,
        ..Default::default()
      });
      return session;
    }

    let (Some(username), Some(password)) = (username, password) else {
      session.notice = Some("Not signed in".to_string());
      return session;
    };

    let form = LoginForm { username, password };
    let result = session.login(executor, &form).await.map(|_| ());
    if let Err(err) = result {
      warn!(error = %err, "start-up login failed");
      session.notice = Some(format!("Login failed: {}", err.user_message()));
    }
    session
  }

  /// Create an account with `api.username` as the email and
  /// BOOKLEND_PASSWORD, then continue signed in as it.
  pub async fn start_registered(
    config: &Config,
    credentials: Credentials,
    executor: &MutationExecutor,
    first_name: String,
    last_name: String,
  ) -> Self {
    let form = match (config.api.username.clone(), Config::get_password()) {
      (Some(email), Some(password)) => Some(RegisterForm {
        email,
        password,
        first_name,
        last_name,
      }),
      _ => None,
    };
    Self::register_with(credentials, executor, form).await
  }

  async fn register_with(
    credentials: Credentials,
    executor: &MutationExecutor,
    form: Option<RegisterForm>,
  ) -> Self {
    let mut session = Self::new(credentials);
    let Some(form) = form else {
      session.notice = Some("Registering needs api.username and BOOKLEND_PASSWORD".to_string());
      return session;
    };
    let result = session.register(executor, &form).await.map(|_| ());
    if let Err(err) = result {
      warn!(error = %err, "registration failed");
      session.notice = Some(format!("Registration failed: {}", err.user_message()));
    }
    session
  }

  pub async fn login(&mut self, executor: &MutationExecutor, form: &LoginForm) -> Result<&User, ApiError> {
    let value = executor
      .execute(&LOGIN, MutationArgs::body(form.payload()?))
      .await?;
    self.apply_auth(value)
  }

  pub async fn register(
    &mut self,
    executor: &MutationExecutor,
    form: &RegisterForm,
  ) -> Result<&User, ApiError> {
    let value = executor
      .execute(&REGISTER, MutationArgs::body(form.payload()?))
      .await?;
    self.apply_auth(value)
  }

  fn apply_auth(&mut self, value: Value) -> Result<&User, ApiError> {
    let auth: AuthResponse = serde_json::from_value(value)?;
    self.credentials.set(auth.access);
    self.notice = None;
    info!(user = %auth.user.username, admin = auth.user.is_admin(), "signed in");
    let user = self.user.insert(auth.user);
    Ok(&*user)
  }

  /// Forget the credential and every cached response.
  pub fn logout(&mut self, cache: &ResourceCache) -> usize {
    self.credentials.clear();
    self.user = None;
    self.notice = Some("Signed out".to_string());
    let count = cache.invalidate_all();
    info!(invalidated = count, "signed out");
    count
  }

  pub fn user(&self) -> Option<&User> {
    self.user.as_ref()
  }

  #[cfg(test)]
  pub(crate) fn set_user(&mut self, user: User) {
    self.user = Some(user);
  }

  pub fn is_admin(&self) -> bool {
    self.user.as_ref().is_some_and(User::is_admin)
  }

  pub fn is_authenticated(&self) -> bool {
    self.credentials.is_present()
  }

  pub fn notice(&self) -> Option<&str> {
    self.notice.as_deref()
  }
}
