//! Static CRUD screen configuration for user attributes.
//!
//! The admin frontend reads this table to decide which fields appear on which
//! page, what can be searched and filtered, and how listings are sorted.

use crate::services::attribute_service::{AttributeField, Direction};
use serde::{Deserialize, Serialize, Serializer};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CrudPage {
    #[default]
    Index,
    Detail,
    New,
    Edit,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Id,
    Association,
    Text,
    Textarea,
    DateTime,
}

#[derive(Serialize, Clone, Copy, Debug)]
pub struct CrudField {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub help: Option<&'static str>,
    /// Textarea height.
    pub rows: Option<u8>,
    pub on_index: bool,
    pub on_detail: bool,
    pub on_form: bool,
    /// Qualified columns searched by the free-text box; empty when the field
    /// is not searchable. Serialized as a flag only.
    #[serde(rename = "searchable", serialize_with = "serialize_searchable")]
    pub search_columns: &'static [&'static str],
}

impl CrudField {
    const fn new(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            required: false,
            help: None,
            rows: None,
            on_index: true,
            on_detail: true,
            on_form: true,
            search_columns: &[],
        }
    }

    const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    const fn help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }

    const fn rows(mut self, rows: u8) -> Self {
        self.rows = Some(rows);
        self
    }

    const fn hide_on_form(mut self) -> Self {
        self.on_form = false;
        self
    }

    const fn hide_on_index(mut self) -> Self {
        self.on_index = false;
        self
    }

    const fn only_on_detail(mut self) -> Self {
        self.on_index = false;
        self.on_form = false;
        self
    }

    const fn searchable(mut self, columns: &'static [&'static str]) -> Self {
        self.search_columns = columns;
        self
    }

    pub fn visible_on(&self, page: CrudPage) -> bool {
        match page {
            CrudPage::Index => self.on_index,
            CrudPage::Detail => self.on_detail,
            CrudPage::New | CrudPage::Edit => self.on_form,
        }
    }
}

fn serialize_searchable<S: Serializer>(
    columns: &&'static [&'static str],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_bool(!columns.is_empty())
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Exact match on the referenced record.
    Entity,
    /// Substring match.
    Text,
}

#[derive(Serialize, Clone, Copy, Debug)]
pub struct CrudFilter {
    pub field: &'static str,
    pub label: &'static str,
    pub kind: FilterKind,
}

#[derive(Serialize, Clone, Copy, Debug)]
pub struct CrudConfig {
    pub route_path: &'static str,
    pub route_name: &'static str,
    pub label_singular: &'static str,
    pub label_plural: &'static str,
    pub default_sort: &'static [(AttributeField, Direction)],
    pub actions_inlined: bool,
    /// Row actions offered on the index page.
    pub index_actions: &'static [&'static str],
    #[serde(skip)]
    page_titles: [(CrudPage, &'static str); 4],
    pub fields: &'static [CrudField],
    pub filters: &'static [CrudFilter],
}

pub static USER_ATTRIBUTE_CRUD: CrudConfig = CrudConfig {
    route_path: "/user/attribute",
    route_name: "user_attribute",
    label_singular: "User attribute",
    label_plural: "User attributes",
    default_sort: &[(AttributeField::Id, Direction::Desc)],
    actions_inlined: true,
    index_actions: &["detail", "edit", "delete"],
    page_titles: [
        (CrudPage::Index, "User attributes"),
        (CrudPage::New, "Create user attribute"),
        (CrudPage::Edit, "Edit user attribute"),
        (CrudPage::Detail, "User attribute details"),
    ],
    fields: &[
        CrudField::new("id", "ID", FieldKind::Id).hide_on_form(),
        CrudField::new("user", "User", FieldKind::Association)
            .required()
            .searchable(&["u.identifier", "u.username", "u.nickname"]),
        CrudField::new("name", "Name", FieldKind::Text)
            .required()
            .help("Identifier of the attribute")
            .searchable(&["a.name"]),
        CrudField::new("value", "Value", FieldKind::Textarea)
            .required()
            .help("Attribute content, stored as raw text")
            .rows(3)
            .searchable(&["a.value"]),
        CrudField::new("remark", "Remark", FieldKind::Textarea)
            .hide_on_index()
            .help("Note describing this attribute")
            .rows(2),
        CrudField::new("created_by", "Created by", FieldKind::Text).only_on_detail(),
        CrudField::new("updated_by", "Updated by", FieldKind::Text).only_on_detail(),
        CrudField::new("created_from_ip", "Created from IP", FieldKind::Text).only_on_detail(),
        CrudField::new("updated_from_ip", "Updated from IP", FieldKind::Text).only_on_detail(),
        CrudField::new("create_time", "Created at", FieldKind::DateTime).only_on_detail(),
        CrudField::new("update_time", "Updated at", FieldKind::DateTime).only_on_detail(),
    ],
    filters: &[
        CrudFilter {
            field: "user",
            label: "User",
            kind: FilterKind::Entity,
        },
        CrudFilter {
            field: "name",
            label: "Name",
            kind: FilterKind::Text,
        },
        CrudFilter {
            field: "value",
            label: "Value",
            kind: FilterKind::Text,
        },
    ],
};

impl CrudConfig {
    pub fn fields_for(&self, page: CrudPage) -> Vec<&CrudField> {
        self.fields.iter().filter(|f| f.visible_on(page)).collect()
    }

    /// Every column the free-text search box looks at.
    pub fn search_columns(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .flat_map(|f| f.search_columns.iter().copied())
            .collect()
    }

    pub fn page_title(&self, page: CrudPage) -> &'static str {
        self.page_titles
            .iter()
            .find(|(p, _)| *p == page)
            .map(|(_, title)| *title)
            .unwrap_or(self.label_plural)
    }

    /// URI of the list screen under the admin mount point.
    pub fn list_uri(&self, admin_prefix: &str) -> String {
        format!("{}{}", admin_prefix.trim_end_matches('/'), self.route_path)
    }
}
