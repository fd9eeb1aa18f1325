//! Shared constants for end-to-end tests
//!
//! When the fixture catalog changes, update only this file.

// ============================================================================
// Backend Credentials
// ============================================================================

/// API key the test bridge uses as its fallback backend credential
pub const TEST_API_KEY: &str = "e2e-backend-key";

/// API key sent through the `x-backend-api-key` override header
pub const OVERRIDE_API_KEY: &str = "e2e-override-key";

// ============================================================================
// Fixture Catalog
// ============================================================================

/// Node "Gmail"
pub const GMAIL_KEY: &str = "vendor.gmail";

/// Trigger node "Gmail Trigger"
pub const GMAIL_TRIGGER_KEY: &str = "vendor.gmailTrigger";

/// Node "Email Sender"
pub const EMAIL_SEND_KEY: &str = "vendor.emailSend";
pub const EMAIL_SEND_NAME: &str = "Email Sender";

/// Node "HTTP Request"
pub const HTTP_REQUEST_KEY: &str = "vendor.httpRequest";

/// Template using the Gmail node
pub const DIGEST_TEMPLATE_ID: &str = "tpl-gmail-digest";

/// Number of nodes in the fixture catalog
pub const FIXTURE_NODE_COUNT: usize = 4;

/// Number of templates in the fixture catalog
pub const FIXTURE_TEMPLATE_COUNT: usize = 2;

// ============================================================================
// Mock Backend
// ============================================================================

/// Workflows served per page by the mock backend
pub const MOCK_PAGE_SIZE: usize = 2;

/// Total workflows known to the mock backend
pub const MOCK_WORKFLOW_COUNT: usize = 5;

/// Version reported by the mock backend
pub const MOCK_BACKEND_VERSION: &str = "1.42.0";

// ============================================================================
// Timeouts
// ============================================================================

/// Maximum time to wait for the test server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Interval between readiness checks (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

/// HTTP request timeout for test client (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;
