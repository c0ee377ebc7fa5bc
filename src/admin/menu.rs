//! Admin navigation contributed by this service.

use crate::admin::crud::USER_ATTRIBUTE_CRUD;
use serde::Serialize;

pub const USER_MODULE_GROUP: &str = "User module";
pub const USER_ATTRIBUTES_ITEM: &str = "User attributes";
const USER_ATTRIBUTES_ICON: &str = "fas fa-user-cog";

/// A node in the admin menu tree. Children are keyed by label.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct MenuItem {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MenuItem>,
}

impl MenuItem {
    pub fn root() -> Self {
        Self::new("root")
    }

    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn child(&self, label: &str) -> Option<&MenuItem> {
        self.children.iter().find(|c| c.label == label)
    }

    /// Add a child, replacing any existing child with the same label in place.
    pub fn add_child(&mut self, label: impl Into<String>) -> &mut MenuItem {
        let item = MenuItem::new(label);
        match self.children.iter().position(|c| c.label == item.label) {
            Some(pos) => {
                self.children[pos] = item;
                &mut self.children[pos]
            }
            None => {
                self.children.push(item);
                let last = self.children.len() - 1;
                &mut self.children[last]
            }
        }
    }

    /// Existing child with `label`, or a new empty one.
    pub fn ensure_child(&mut self, label: &str) -> &mut MenuItem {
        match self.children.iter().position(|c| c.label == label) {
            Some(pos) => &mut self.children[pos],
            None => self.add_child(label),
        }
    }

    pub fn set_uri(&mut self, uri: impl Into<String>) -> &mut Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn set_icon(&mut self, icon: impl Into<String>) -> &mut Self {
        self.icon = Some(icon.into());
        self
    }
}

/// Adds the user attribute screen under the shared "User module" group.
#[derive(Clone, Debug)]
pub struct AdminMenu {
    admin_prefix: String,
}

impl AdminMenu {
    pub fn new(admin_prefix: impl Into<String>) -> Self {
        Self {
            admin_prefix: admin_prefix.into(),
        }
    }

    pub fn contribute(&self, root: &mut MenuItem) {
        root.ensure_child(USER_MODULE_GROUP)
            .add_child(USER_ATTRIBUTES_ITEM)
            .set_uri(USER_ATTRIBUTE_CRUD.list_uri(&self.admin_prefix))
            .set_icon(USER_ATTRIBUTES_ICON);
    }

    /// Full menu tree containing this service's entries.
    pub fn build(&self) -> MenuItem {
        let mut root = MenuItem::root();
        self.contribute(&mut root);
        root
    }
}
