/*
 * Copyright 2025, the University of Queensland
 * Author: Alex Wilson <alex@uq.edu.au>
 *
 * Permission to use, copy, modify, and distribute this software for any
 * purpose with or without fee is hereby granted, provided that the above
 * copyright notice and this permission notice appear in all copies.
 *
 * THE SOFTWARE IS PROVIDED "AS IS" AND THE AUTHOR DISCLAIMS ALL WARRANTIES
 * WITH REGARD TO THIS SOFTWARE INCLUDING ALL IMPLIED WARRANTIES OF
 * MERCHANTABILITY AND FITNESS. IN NO EVENT SHALL THE AUTHOR BE LIABLE FOR
 * ANY SPECIAL, DIRECT, INDIRECT, OR CONSEQUENTIAL DAMAGES OR ANY DAMAGES
 * WHATSOEVER RESULTING FROM LOSS OF USE, DATA OR PROFITS, WHETHER IN AN
 * ACTION OF CONTRACT, NEGLIGENCE OR OTHER TORTIOUS ACTION, ARISING OUT OF
 * OR IN CONNECTION WITH THE USE OR PERFORMANCE OF THIS SOFTWARE.
 */

//! The verified user, as built from a gateway response.

use std::fmt;
use std::sync::LazyLock;

use chrono::Datelike;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::protocol::AttributeMap;

/// Org-unit code shared by all staff.
pub const OU_TEACHER: &str = "ucitele";

/// Student org-unit codes: facility letter, two-digit entry year, class
/// letter, optional suffix (e.g. `i21b`, `e19a2`).
static OU_STUDENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\p{L})([0-9]{2})(\p{L})(.?)$").unwrap()
});

#[derive(Debug, PartialEq, Clone)]
pub enum ConstructionFailure {
    MissingRequiredField(&'static str),
}

impl fmt::Display for ConstructionFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConstructionFailure::MissingRequiredField(key) =>
                write!(f, "required attribute {:?} missing", key),
        }
    }
}

impl std::error::Error for ConstructionFailure {}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    pub login: String,
    pub name: String,
    pub groups: Vec<String>,
    pub email: Option<String>,
    pub group_name: Option<String>,
    pub auth_by: Option<String>,
    #[serde(rename = "ouSimple")]
    pub org_unit_code: Option<String>,
    #[serde(rename = "ouName")]
    pub org_unit_name: Option<String>,
    /// Attributes this library does not know about, verbatim.
    pub other_attributes: AttributeMap,
}

/// Last value of a scalar attribute; the gateway may repeat a key.
fn take_last(data: &mut AttributeMap, key: &str) -> Option<String> {
    data.remove(key).and_then(|mut values| values.pop())
}

impl IdentityRecord {
    /// Builds a record from parsed gateway attributes. Known keys are
    /// consumed; whatever is left ends up in `other_attributes`.
    pub fn from_attributes(mut data: AttributeMap) -> Result<IdentityRecord, ConstructionFailure> {
        let login = take_last(&mut data, "login")
            .ok_or(ConstructionFailure::MissingRequiredField("login"))?;
        let name = take_last(&mut data, "name")
            .ok_or(ConstructionFailure::MissingRequiredField("name"))?;
        let groups = data.remove("group").unwrap_or_default();
        let email = take_last(&mut data, "mail");
        let group_name = take_last(&mut data, "group_name").filter(|g| !g.is_empty());
        let auth_by = take_last(&mut data, "auth_by");
        let org_unit_code = take_last(&mut data, "ou_simple");
        let org_unit_name = take_last(&mut data, "ou_name");

        Ok(IdentityRecord {
            login,
            name,
            groups,
            email,
            group_name,
            auth_by,
            org_unit_code,
            org_unit_name,
            other_attributes: data,
        })
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }

    pub fn is_teacher(&self) -> bool {
        self.org_unit_code.as_deref() == Some(OU_TEACHER)
    }

    pub fn is_student(&self) -> bool {
        self.student_code().is_some()
    }

    fn student_code(&self) -> Option<Captures<'_>> {
        OU_STUDENT_RE.captures(self.org_unit_code.as_deref()?)
    }

    /// Student's class name, e.g. "4.B".
    pub fn class(&self) -> Option<&str> {
        if self.is_student() { self.org_unit_name.as_deref() } else { None }
    }

    pub fn field_of_study(&self) -> Option<String> {
        self.student_code().map(|c| c[1].to_uppercase())
    }

    pub fn study_entry_year(&self) -> Option<i32> {
        self.study_entry_year_at(chrono::Local::now().year())
    }

    /// Expands the two-digit entry year from the org-unit code into the
    /// century that puts it at most one year after `current_year`.
    pub fn study_entry_year_at(&self, current_year: i32) -> Option<i32> {
        let yy: i32 = self.student_code()?[2].parse().ok()?;
        let mut year = current_year - current_year.rem_euclid(100) + yy;
        if year > current_year + 1 {
            year -= 100;
        }
        Some(year)
    }

    /// The record together with everything derived from it.
    pub fn view(&self) -> IdentityView<'_> {
        IdentityView {
            record: self,
            is_teacher: self.is_teacher(),
            is_student: self.is_student(),
            field_of_study: self.field_of_study(),
            study_entry_year: self.study_entry_year(),
            class: self.class(),
        }
    }
}

/// Serializable form of an [`IdentityRecord`] including derived fields.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct IdentityView<'a> {
    #[serde(flatten)]
    pub record: &'a IdentityRecord,
    pub is_teacher: bool,
    pub is_student: bool,
    pub field_of_study: Option<String>,
    pub study_entry_year: Option<i32>,
    pub class: Option<&'a str>,
}

fn row(f: &mut fmt::Formatter, label: &str, value: Option<&str>) -> fmt::Result {
    writeln!(f, "{:>16}: {}", label, value.unwrap_or("-"))
}

impl fmt::Display for IdentityRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let yes_no = |b: bool| if b { "yes" } else { "no" };
        row(f, "Login", Some(self.login.as_str()))?;
        row(f, "Name", Some(self.name.as_str()))?;
        row(f, "E-mail", self.email.as_deref())?;
        row(f, "Group", self.group_name.as_deref())?;
        let groups = self.groups.join(", ");
        row(f, "Groups", Some(groups.as_str()).filter(|s| !s.is_empty()))?;
        row(f, "Auth by", self.auth_by.as_deref())?;
        row(f, "OU simple", self.org_unit_code.as_deref())?;
        row(f, "OU name", self.org_unit_name.as_deref())?;
        row(f, "Is teacher", Some(yes_no(self.is_teacher())))?;
        row(f, "Is student", Some(yes_no(self.is_student())))?;
        if self.is_student() {
            row(f, "Field of study", self.field_of_study().as_deref())?;
            row(f, "Study entry year", self.study_entry_year().map(|y| y.to_string()).as_deref())?;
        }
        for (key, values) in self.other_attributes.iter() {
            let joined = values.join(", ");
            row(f, key, Some(joined.as_str()).filter(|s| !s.is_empty()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::parse_response;

    fn record(body: &str) -> IdentityRecord {
        IdentityRecord::from_attributes(parse_response(body)).unwrap()
    }

    fn with_ou(code: &str) -> IdentityRecord {
        record(&format!("login:x\nname:X\nou_simple:{}\nou_name:4.B\n", code))
    }

    #[test]
    fn requires_login_and_name() {
        assert_eq!(IdentityRecord::from_attributes(parse_response("name:Bob\n")),
            Err(ConstructionFailure::MissingRequiredField("login")));
        assert_eq!(IdentityRecord::from_attributes(parse_response("login:bob\n")),
            Err(ConstructionFailure::MissingRequiredField("name")));
    }

    #[test]
    fn extracts_known_keys() {
        let u = record("login:alice\nlogin:alice2\nname:Alice A\ngroup:admins\ngroup:users\n\
            mail:alice@example.org\ngroup_name:Staff\nauth_by:password\nphone:123\nphone:456\n");
        assert_eq!(u.login, "alice2");
        assert_eq!(u.name, "Alice A");
        assert_eq!(u.groups, vec!["admins", "users"]);
        assert_eq!(u.email.as_deref(), Some("alice@example.org"));
        assert_eq!(u.group_name.as_deref(), Some("Staff"));
        assert_eq!(u.auth_by.as_deref(), Some("password"));
        assert!(u.has_group("users"));
        assert!(!u.has_group("nobody"));

        let mut other = AttributeMap::new();
        other.insert("phone".into(), vec!["123".into(), "456".into()]);
        assert_eq!(u.other_attributes, other);
    }

    #[test]
    fn empty_group_name_is_absent() {
        let u = record("login:a\nname:A\ngroup_name:\n");
        assert_eq!(u.group_name, None);
        assert!(u.groups.is_empty());
        assert!(u.other_attributes.is_empty());
    }

    #[test]
    fn student_code() {
        let u = with_ou("i21b");
        assert!(u.is_student());
        assert!(!u.is_teacher());
        assert_eq!(u.field_of_study().as_deref(), Some("I"));
        assert_eq!(u.study_entry_year_at(2025), Some(2021));
        assert_eq!(u.class(), Some("4.B"));

        assert!(with_ou("e19a2").is_student());
        assert!(!with_ou("i2b").is_student());
        assert!(!with_ou("i21b23").is_student());
    }

    #[test]
    fn entry_year_rolls_back_a_century() {
        assert_eq!(with_ou("x99a").study_entry_year_at(2025), Some(1999));
        assert_eq!(with_ou("x26a").study_entry_year_at(2025), Some(2026));
        assert_eq!(with_ou("x27a").study_entry_year_at(2025), Some(1927));
        assert_eq!(with_ou("x00a").study_entry_year_at(2099), Some(2000));
        assert_eq!(with_ou("x01a").study_entry_year_at(2099), Some(2001));
    }

    #[test]
    fn teacher_code() {
        let u = with_ou(OU_TEACHER);
        assert!(u.is_teacher());
        assert!(!u.is_student());
        assert_eq!(u.field_of_study(), None);
        assert_eq!(u.study_entry_year(), None);
        assert_eq!(u.class(), None);
    }

    #[test]
    fn no_org_unit() {
        let u = record("login:carol\nname:Carol C\n");
        assert!(!u.is_teacher());
        assert!(!u.is_student());
        assert_eq!(u.study_entry_year_at(2025), None);
    }

    #[test]
    fn view_serializes_derived_fields() {
        let u = with_ou("i21b");
        let json = serde_json::to_value(u.view()).unwrap();
        assert_eq!(json["login"], "x");
        assert_eq!(json["ouSimple"], "i21b");
        assert_eq!(json["isStudent"], true);
        assert_eq!(json["isTeacher"], false);
        assert_eq!(json["fieldOfStudy"], "I");
        assert_eq!(json["class"], "4.B");
        assert!(json["otherAttributes"].as_object().unwrap().is_empty());
    }

    #[test]
    fn display_lists_other_attributes() {
        let text = record("login:dan\nname:Dan D\nroom:101\nroom:102\n").to_string();
        assert!(text.contains("Login: dan"));
        assert!(text.contains("Is student: no"));
        assert!(text.contains("room: 101, 102"));
        assert!(!text.contains("Field of study"));
    }
}
