/// Router Module Index
///
/// The menu context is rendered for anonymous visitors as well as authenticated users, so its
/// routes carry no authentication layer; the `Principal` extractor resolves identity per request.

/// Health and navigation-context routes.
pub mod public;
