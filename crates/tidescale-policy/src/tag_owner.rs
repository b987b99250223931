//! who may apply which tags.

use tidescale_types::{Tag, User};

use crate::alias::{Alias, Autogroup};
use crate::engine::PolicyEngine;
use crate::error::TagOwnerError;

impl PolicyEngine {
    /// check that `user` may apply every tag in `tags`.
    ///
    /// each tag must be defined in `tagOwners`. the tailnet's service user
    /// owns every defined tag; anyone else must be listed directly, through a
    /// group, or through `autogroup:member`. the first failure rejects the
    /// whole set.
    pub fn check_tag_owners(&self, tags: &[Tag], user: &User) -> Result<(), TagOwnerError> {
        for tag in tags {
            let owners = self
                .policy()
                .tag_owners
                .get(tag.as_str())
                .ok_or_else(|| TagOwnerError::UndefinedTag(tag.to_string()))?;

            if user.is_service() {
                continue;
            }
            if !owners.iter().any(|owner| self.owner_matches(owner, user)) {
                return Err(TagOwnerError::NotOwner {
                    tag: tag.to_string(),
                    user: user.login_name().to_string(),
                });
            }
        }
        Ok(())
    }

    fn owner_matches(&self, owner: &Alias, user: &User) -> bool {
        match owner {
            Alias::Wildcard => true,
            Alias::User(login) => login == user.login_name(),
            Alias::Group(group) => self.policy().is_group_member(group, user.login_name()),
            Alias::Autogroup(Autogroup::Member) => !user.is_service(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use tidescale_types::{TailnetId, UserId};

    use super::*;
    use crate::policy::AclPolicy;

    fn engine() -> PolicyEngine {
        PolicyEngine::new(
            AclPolicy::parse(
                r#"{
                    "groups": {"group:ops": ["bob@example.com"]},
                    "tagOwners": {
                        "tag:server": ["alice@example.com", "group:ops"],
                        "tag:ci": [],
                        "tag:anyone": ["autogroup:member"]
                    }
                }"#,
            )
            .unwrap(),
        )
    }

    fn tags(names: &[&str]) -> Vec<Tag> {
        Tag::parse_all(names.iter().copied()).unwrap()
    }

    fn person(login: &str) -> User {
        User::new(UserId(1), TailnetId(1), login)
    }

    #[test]
    fn test_direct_and_group_owners() {
        let engine = engine();
        assert!(engine
            .check_tag_owners(&tags(&["tag:server"]), &person("alice@example.com"))
            .is_ok());
        assert!(engine
            .check_tag_owners(&tags(&["tag:server"]), &person("bob@example.com"))
            .is_ok());
        assert_eq!(
            engine.check_tag_owners(&tags(&["tag:server"]), &person("eve@example.com")),
            Err(TagOwnerError::NotOwner {
                tag: "tag:server".into(),
                user: "eve@example.com".into()
            })
        );
    }

    #[test]
    fn test_first_failure_rejects_all() {
        let engine = engine();
        let result =
            engine.check_tag_owners(&tags(&["tag:server", "tag:ci"]), &person("alice@example.com"));
        assert!(matches!(result, Err(TagOwnerError::NotOwner { tag, .. }) if tag == "tag:ci"));
    }

    #[test]
    fn test_undefined_tag() {
        let engine = engine();
        assert_eq!(
            engine.check_tag_owners(&tags(&["tag:nope"]), &person("alice@example.com")),
            Err(TagOwnerError::UndefinedTag("tag:nope".into()))
        );
    }

    #[test]
    fn test_service_user_owns_defined_tags() {
        let engine = engine();
        let service = User::service(UserId(9), TailnetId(1));
        assert!(engine.check_tag_owners(&tags(&["tag:ci"]), &service).is_ok());
        assert!(engine.check_tag_owners(&tags(&["tag:nope"]), &service).is_err());
    }

    #[test]
    fn test_member_autogroup() {
        let engine = engine();
        assert!(engine
            .check_tag_owners(&tags(&["tag:anyone"]), &person("zed@example.com"))
            .is_ok());
    }
}
