//! Connection rules: which pairs of doorways may be joined.
//!
//! The flow asset carries socket and tag rules as plain data. Callers can add
//! prioritised `ConnectionRule` implementations on top; the first rule that
//! does not pass decides, otherwise the data rules decide.

use crate::template::{DoorwayTemplate, TemplateId, TileTemplate};
use serde::{Deserialize, Serialize};

/// One side of a proposed connection.
#[derive(Clone, Copy)]
pub struct DoorwayEnd<'a> {
    pub template_id: TemplateId,
    pub template: &'a TileTemplate,
    pub doorway_index: usize,
    pub doorway: &'a DoorwayTemplate,
}

/// A candidate pairing of an exit doorway on a placed tile with an entrance
/// doorway on a template that has not been placed yet.
#[derive(Clone, Copy)]
pub struct ProposedConnection<'a> {
    pub previous: DoorwayEnd<'a>,
    pub next: DoorwayEnd<'a>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionVerdict {
    Allow,
    Deny,
    /// Defer to lower priority rules.
    Passthrough,
}

/// A caller-supplied connection rule.
pub trait ConnectionRule {
    /// Rules with a higher priority are consulted first.
    fn priority(&self) -> i32 {
        0
    }

    fn evaluate(&self, proposal: &ProposedConnection) -> ConnectionVerdict;
}

impl<F> ConnectionRule for F
where
    F: Fn(&ProposedConnection) -> ConnectionVerdict,
{
    fn evaluate(&self, proposal: &ProposedConnection) -> ConnectionVerdict {
        self(proposal)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagConnectionMode {
    /// Tiles connect only if one of the tag pairs matches.
    Accept,
    /// Tiles never connect if one of the tag pairs matches.
    #[default]
    Reject,
}

/// Data-driven connection rules stored on the flow.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Socket pairs that connect in addition to identical sockets.
    #[serde(default)]
    pub compatible_sockets: Vec<(String, String)>,
    #[serde(default)]
    pub tag_mode: TagConnectionMode,
    /// Tag pairs checked in both directions. Empty disables tag rules.
    #[serde(default)]
    pub tag_pairs: Vec<(String, String)>,
}

impl ConnectionSettings {
    pub fn sockets_compatible(&self, a: &str, b: &str) -> bool {
        a == b
            || self
                .compatible_sockets
                .iter()
                .any(|(x, y)| (x == a && y == b) || (x == b && y == a))
    }

    fn tags_match(&self, a: &TileTemplate, b: &TileTemplate) -> bool {
        self.tag_pairs.iter().any(|(x, y)| {
            (a.has_tag(x) && b.has_tag(y)) || (a.has_tag(y) && b.has_tag(x))
        })
    }

    pub fn tags_allow(&self, a: &TileTemplate, b: &TileTemplate) -> bool {
        if self.tag_pairs.is_empty() {
            return true;
        }
        match self.tag_mode {
            TagConnectionMode::Accept => self.tags_match(a, b),
            TagConnectionMode::Reject => !self.tags_match(a, b),
        }
    }
}

/// The connection-validity predicate used by the pairing engine.
pub struct ConnectionRules {
    settings: ConnectionSettings,
    custom: Vec<Box<dyn ConnectionRule>>,
}

impl ConnectionRules {
    pub fn new(settings: ConnectionSettings, mut custom: Vec<Box<dyn ConnectionRule>>) -> Self {
        // Stable sort keeps registration order among equal priorities.
        custom.sort_by_key(|rule| std::cmp::Reverse(rule.priority()));
        ConnectionRules { settings, custom }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn can_connect(&self, proposal: &ProposedConnection) -> bool {
        for rule in &self.custom {
            match rule.evaluate(proposal) {
                ConnectionVerdict::Allow => return true,
                ConnectionVerdict::Deny => return false,
                ConnectionVerdict::Passthrough => {}
            }
        }

        self.settings
            .sockets_compatible(&proposal.previous.doorway.socket, &proposal.next.doorway.socket)
            && self
                .settings
                .tags_allow(proposal.previous.template, proposal.next.template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Bounds;
    use glam::Vec3;

    fn template(name: &str, socket: &str, tag: &str) -> TileTemplate {
        TileTemplate::new(name, Bounds::new(Vec3::ZERO, Vec3::ONE))
            .with_doorway(DoorwayTemplate::new(socket, Vec3::ZERO, Vec3::Z))
            .with_tag(tag)
    }

    fn proposal<'a>(a: &'a TileTemplate, b: &'a TileTemplate) -> ProposedConnection<'a> {
        ProposedConnection {
            previous: DoorwayEnd {
                template_id: TemplateId(0),
                template: a,
                doorway_index: 0,
                doorway: &a.doorways[0],
            },
            next: DoorwayEnd {
                template_id: TemplateId(1),
                template: b,
                doorway_index: 0,
                doorway: &b.doorways[0],
            },
        }
    }

    #[test]
    fn sockets_must_match_or_be_paired() {
        let a = template("a", "small", "x");
        let b = template("b", "large", "y");
        let rules = ConnectionRules::new(ConnectionSettings::default(), Vec::new());
        assert!(!rules.can_connect(&proposal(&a, &b)));

        let settings = ConnectionSettings {
            compatible_sockets: vec![("large".to_string(), "small".to_string())],
            ..Default::default()
        };
        let rules = ConnectionRules::new(settings, Vec::new());
        assert!(rules.can_connect(&proposal(&a, &b)));
    }

    #[test]
    fn tag_modes() {
        let a = template("a", "door", "cave");
        let b = template("b", "door", "castle");
        let reject = ConnectionSettings {
            tag_mode: TagConnectionMode::Reject,
            tag_pairs: vec![("castle".to_string(), "cave".to_string())],
            ..Default::default()
        };
        assert!(!ConnectionRules::new(reject.clone(), Vec::new()).can_connect(&proposal(&a, &b)));

        let accept = ConnectionSettings {
            tag_mode: TagConnectionMode::Accept,
            ..reject
        };
        assert!(ConnectionRules::new(accept, Vec::new()).can_connect(&proposal(&a, &b)));
    }

    struct Fixed(ConnectionVerdict, i32);

    impl ConnectionRule for Fixed {
        fn priority(&self) -> i32 {
            self.1
        }

        fn evaluate(&self, _proposal: &ProposedConnection) -> ConnectionVerdict {
            self.0
        }
    }

    #[test]
    fn custom_rules_run_by_priority() {
        let a = template("a", "door", "x");
        let b = template("b", "door", "x");
        let rules = ConnectionRules::new(
            ConnectionSettings::default(),
            vec![
                Box::new(Fixed(ConnectionVerdict::Allow, 0)),
                Box::new(Fixed(ConnectionVerdict::Deny, 1)),
            ],
        );
        assert!(!rules.can_connect(&proposal(&a, &b)));

        let rules = ConnectionRules::new(
            ConnectionSettings::default(),
            vec![Box::new(Fixed(ConnectionVerdict::Passthrough, 5))],
        );
        assert!(rules.can_connect(&proposal(&a, &b)));
    }
}
