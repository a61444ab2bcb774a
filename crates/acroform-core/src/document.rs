//! Editable and flattened views of a PDF form
//!
//! A [`FormDocument`] owns a parsed lopdf document plus a snapshot of its
//! AcroForm field tree. Writes go through kind-checked setters that also
//! regenerate widget appearances. [`FormDocument::flatten`] consumes the
//! editable handle and returns a [`FlattenedDocument`], which can only be
//! serialized.

use std::collections::{BTreeMap, BTreeSet};

use lopdf::{encryption, Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, warn};

use crate::appearance::{checkbox_appearance, font_size_from_da, text_appearance};
use crate::error::{FieldError, FormError};
use crate::geometry::normalize_rect;
use crate::model::{FieldKind, FieldValue};
use crate::text::{decode_text_string, encode_text_string};

/// `/Ff` bit 13: text field may hold several lines
const FLAG_MULTILINE: i64 = 1 << 12;
/// Annotation `/F` bits that keep a widget off the rendered page
const ANNOT_HIDDEN: i64 = 1 << 1;
const ANNOT_NO_VIEW: i64 = 1 << 5;

const OFF_STATE: &[u8] = b"Off";
const DEFAULT_ON_STATE: &[u8] = b"Yes";

/// A terminal field of the AcroForm tree
#[derive(Debug, Clone)]
pub struct FormField {
    /// Object holding the field's `/V`
    pub id: ObjectId,
    /// Fully qualified name (`parent.child`)
    pub name: String,
    pub kind: FieldKind,
    pub flags: i64,
    /// Widget annotations in document order
    pub widgets: Vec<ObjectId>,
    value: Option<Object>,
    da: Option<String>,
}

/// Inheritable field attributes collected while walking down the tree
#[derive(Debug, Clone, Default)]
struct Inherited {
    ft: Option<Vec<u8>>,
    ff: Option<i64>,
    da: Option<String>,
    v: Option<Object>,
}

enum AnnotAction {
    Keep,
    Drop,
    Stamp(ObjectId, [f64; 6]),
}

/// Editable form document
pub struct FormDocument {
    doc: Document,
    pages: BTreeMap<u32, ObjectId>,
    fields: Vec<FormField>,
}

impl FormDocument {
    /// Parse PDF bytes and index the field tree.
    ///
    /// Documents encrypted with an owner password only are decrypted with the
    /// empty user password. If that fails the raw objects are used as-is.
    pub fn load(bytes: &[u8]) -> Result<Self, FormError> {
        let mut doc =
            Document::load_mem(bytes).map_err(|e| FormError::Unreadable(e.to_string()))?;

        if doc.is_encrypted() {
            match decrypt_with_empty_password(&mut doc) {
                Ok(()) => debug!("Decrypted document with the empty user password"),
                Err(e) => warn!(
                    "Document is encrypted and could not be decrypted ({}), reading raw objects",
                    e
                ),
            }
        }

        let pages = doc.get_pages();
        let mut form = Self {
            doc,
            pages,
            fields: Vec::new(),
        };
        form.fields = form.collect_fields();
        debug!(
            "Loaded form with {} pages and {} fields",
            form.pages.len(),
            form.fields.len()
        );
        Ok(form)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Terminal fields in tree order
    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    /// Value of a field as it was when the document was loaded
    pub fn read_value(&self, field: &FormField) -> Option<FieldValue> {
        match field.kind {
            FieldKind::Checkbox => {
                let state = field
                    .value
                    .as_ref()
                    .and_then(|v| v.as_name().ok())
                    .or_else(|| {
                        field
                            .widgets
                            .first()
                            .and_then(|w| self.dict(*w))
                            .and_then(|d| d.get(b"AS").ok())
                            .and_then(|o| o.as_name().ok())
                    });
                Some(FieldValue::Flag(matches!(state, Some(s) if s != OFF_STATE)))
            }
            FieldKind::Text | FieldKind::Choice => match field.value.as_ref()? {
                Object::String(bytes, _) => Some(FieldValue::Text(decode_text_string(bytes))),
                Object::Name(name) => Some(FieldValue::Text(
                    String::from_utf8_lossy(name).into_owned(),
                )),
                Object::Array(items) => items
                    .first()
                    .and_then(|o| o.as_str().ok())
                    .map(|bytes| FieldValue::Text(decode_text_string(bytes))),
                _ => None,
            },
        }
    }

    /// Normalized `/Rect` of a widget
    pub fn widget_rect(&self, widget: ObjectId) -> Option<[f64; 4]> {
        self.dict(widget)
            .and_then(|d| d.get(b"Rect").ok())
            .and_then(|o| self.rect(o))
    }

    /// Page number owning a widget.
    ///
    /// Uses the widget's `/P` entry, then scans each page's `/Annots`; falls
    /// back to page 1 when neither resolves.
    pub fn page_of(&self, widget: ObjectId) -> u32 {
        let by_parent_ref = self
            .dict(widget)
            .and_then(|d| d.get(b"P").ok())
            .and_then(|o| o.as_reference().ok())
            .and_then(|page_id| {
                self.pages
                    .iter()
                    .find(|(_, id)| **id == page_id)
                    .map(|(num, _)| *num)
            });

        by_parent_ref
            .or_else(|| {
                self.pages
                    .iter()
                    .find(|(_, page_id)| self.page_annot_refs(**page_id).contains(&widget))
                    .map(|(num, _)| *num)
            })
            .unwrap_or_else(|| {
                debug!("Widget {:?} has no resolvable page, using page 1", widget);
                1
            })
    }

    /// Set a text field's value and redraw its widgets
    pub fn set_text(&mut self, name: &str, value: &str) -> Result<(), FieldError> {
        for field in self.matching(name, FieldKind::Text)? {
            self.write_display_value(&field, value)?;
        }
        Ok(())
    }

    /// Select a choice field's value and redraw its widgets
    pub fn set_choice(&mut self, name: &str, value: &str) -> Result<(), FieldError> {
        for field in self.matching(name, FieldKind::Choice)? {
            self.write_display_value(&field, value)?;
        }
        Ok(())
    }

    /// Check or uncheck a checkbox field
    pub fn set_checked(&mut self, name: &str, checked: bool) -> Result<(), FieldError> {
        for field in self.matching(name, FieldKind::Checkbox)? {
            let on_states: Vec<Vec<u8>> = field
                .widgets
                .iter()
                .map(|w| self.on_state(*w))
                .collect();
            let field_state = match on_states.first() {
                Some(on) if checked => on.clone(),
                None if checked => DEFAULT_ON_STATE.to_vec(),
                _ => OFF_STATE.to_vec(),
            };

            self.dict_mut(field.id, name)?
                .set("V", Object::Name(field_state.clone()));

            for (widget, on) in field.widgets.iter().copied().zip(on_states) {
                if !self.has_state_appearance(widget, &on) {
                    self.install_checkbox_appearance(widget, &on, name)?;
                }
                let state = if checked && on == field_state {
                    on
                } else {
                    OFF_STATE.to_vec()
                };
                self.dict_mut(widget, name)?.set("AS", Object::Name(state));
            }
        }
        Ok(())
    }

    /// Paint every widget appearance into its page and drop the form.
    ///
    /// This is a terminal transition: the returned document exposes no
    /// fields and cannot be edited.
    pub fn flatten(mut self) -> FlattenedDocument {
        self.draw_missing_appearances();

        let pages: Vec<(u32, ObjectId)> = self.pages.iter().map(|(n, id)| (*n, *id)).collect();
        let mut stamped = 0;
        for (page_num, page_id) in pages {
            match self.flatten_page(page_id) {
                Ok(count) => stamped += count,
                Err(e) => warn!("Could not flatten page {}: {}", page_num, e),
            }
        }

        self.remove_acroform();
        self.doc.prune_objects();
        debug!("Flattened {} widget appearances", stamped);

        FlattenedDocument { doc: self.doc }
    }

    // ------------------------------------------------------------------
    // Field tree
    // ------------------------------------------------------------------

    fn collect_fields(&self) -> Vec<FormField> {
        let mut out = Vec::new();
        let Some(acroform) = self.acroform() else {
            return out;
        };

        let root = Inherited {
            da: acroform
                .get(b"DA")
                .ok()
                .and_then(|o| self.resolve(o))
                .and_then(|o| o.as_str().ok())
                .map(|b| String::from_utf8_lossy(b).into_owned()),
            ..Inherited::default()
        };

        let roots = acroform
            .get(b"Fields")
            .ok()
            .and_then(|o| self.resolve(o))
            .and_then(|o| o.as_array().ok())
            .map(|items| references(items))
            .unwrap_or_default();

        let mut visited = BTreeSet::new();
        for id in roots {
            self.walk(id, None, &root, &mut visited, &mut out);
        }
        out
    }

    fn walk(
        &self,
        id: ObjectId,
        parent: Option<&str>,
        inherited: &Inherited,
        visited: &mut BTreeSet<ObjectId>,
        out: &mut Vec<FormField>,
    ) {
        if !visited.insert(id) {
            warn!("Field tree revisits object {:?}, skipping", id);
            return;
        }
        let Some(dict) = self.dict(id) else {
            debug!("Field object {:?} is not a dictionary", id);
            return;
        };

        let partial = dict
            .get(b"T")
            .ok()
            .and_then(|o| self.resolve(o))
            .and_then(|o| o.as_str().ok())
            .map(decode_text_string);
        let name = match (parent.filter(|p| !p.is_empty()), partial) {
            (Some(p), Some(t)) => format!("{}.{}", p, t),
            (None, Some(t)) => t,
            (Some(p), None) => p.to_string(),
            (None, None) => String::new(),
        };
        let inherited = self.inherit(inherited, dict);

        let kids = dict
            .get(b"Kids")
            .ok()
            .and_then(|o| self.resolve(o))
            .and_then(|o| o.as_array().ok())
            .map(|items| references(items))
            .unwrap_or_default();
        let (field_kids, widget_kids): (Vec<ObjectId>, Vec<ObjectId>) = kids
            .into_iter()
            .partition(|kid| self.dict(*kid).is_some_and(|d| d.has(b"T")));

        if !field_kids.is_empty() {
            for kid in field_kids {
                self.walk(kid, Some(&name), &inherited, visited, out);
            }
            return;
        }

        let widgets = if !widget_kids.is_empty() {
            widget_kids
        } else if is_widget(dict) {
            vec![id]
        } else {
            Vec::new()
        };

        out.push(FormField {
            id,
            name,
            kind: FieldKind::from_field_type(inherited.ft.as_deref()),
            flags: inherited.ff.unwrap_or(0),
            widgets,
            value: inherited.v,
            da: inherited.da,
        });
    }

    fn inherit(&self, base: &Inherited, dict: &Dictionary) -> Inherited {
        let mut next = base.clone();
        let get = |key: &[u8]| dict.get(key).ok().and_then(|o| self.resolve(o));

        if let Some(ft) = get(b"FT").and_then(|o| o.as_name().ok()) {
            next.ft = Some(ft.to_vec());
        }
        if let Some(ff) = get(b"Ff").and_then(|o| o.as_i64().ok()) {
            next.ff = Some(ff);
        }
        if let Some(da) = get(b"DA").and_then(|o| o.as_str().ok()) {
            next.da = Some(String::from_utf8_lossy(da).into_owned());
        }
        if let Some(v) = get(b"V") {
            next.v = Some(v.clone());
        }
        next
    }

    /// Fields named `name` of the expected kind
    fn matching(&self, name: &str, expected: FieldKind) -> Result<Vec<FormField>, FieldError> {
        let (matching, other): (Vec<&FormField>, Vec<&FormField>) = self
            .fields
            .iter()
            .filter(|f| f.name == name)
            .partition(|f| f.kind == expected);

        match (matching.is_empty(), other.first()) {
            (false, _) => Ok(matching.into_iter().cloned().collect()),
            (true, Some(found)) => Err(FieldError::KindMismatch {
                name: name.to_string(),
                expected: expected.as_str(),
                actual: found.kind.as_str(),
            }),
            (true, None) => Err(FieldError::NotFound(name.to_string())),
        }
    }

    // ------------------------------------------------------------------
    // Appearances
    // ------------------------------------------------------------------

    fn write_display_value(&mut self, field: &FormField, value: &str) -> Result<(), FieldError> {
        self.dict_mut(field.id, &field.name)?
            .set("V", encode_text_string(value));
        self.draw_text(field, &field.widgets, value)
    }

    fn draw_text(
        &mut self,
        field: &FormField,
        widgets: &[ObjectId],
        value: &str,
    ) -> Result<(), FieldError> {
        let multiline = field.kind == FieldKind::Text && field.flags & FLAG_MULTILINE != 0;
        let font_size = field.da.as_deref().and_then(font_size_from_da);

        for &widget in widgets {
            let Some([x0, y0, x1, y1]) = self.widget_rect(widget) else {
                debug!("Widget {:?} of '{}' has no /Rect", widget, field.name);
                continue;
            };
            let stream = text_appearance(x1 - x0, y1 - y0, value, font_size, multiline);
            let stream_id = self.doc.add_object(Object::Stream(stream));

            let mut ap = Dictionary::new();
            ap.set("N", Object::Reference(stream_id));
            self.dict_mut(widget, &field.name)?
                .set("AP", Object::Dictionary(ap));
        }
        Ok(())
    }

    /// Name of a widget's "on" appearance state
    fn on_state(&self, widget: ObjectId) -> Vec<u8> {
        self.normal_appearance_states(widget)
            .and_then(|states| {
                states
                    .iter()
                    .map(|(key, _)| key)
                    .find(|key| key.as_slice() != OFF_STATE)
                    .cloned()
            })
            .unwrap_or_else(|| DEFAULT_ON_STATE.to_vec())
    }

    fn has_state_appearance(&self, widget: ObjectId, state: &[u8]) -> bool {
        self.normal_appearance_states(widget)
            .is_some_and(|states| states.has(state))
    }

    fn normal_appearance_states(&self, widget: ObjectId) -> Option<&Dictionary> {
        self.dict(widget)?
            .get(b"AP")
            .ok()
            .and_then(|o| self.resolve(o))
            .and_then(|o| o.as_dict().ok())?
            .get(b"N")
            .ok()
            .and_then(|o| self.resolve(o))
            .and_then(|o| o.as_dict().ok())
    }

    fn install_checkbox_appearance(
        &mut self,
        widget: ObjectId,
        on_state: &[u8],
        name: &str,
    ) -> Result<(), FieldError> {
        let [x0, y0, x1, y1] = self
            .widget_rect(widget)
            .ok_or_else(|| FieldError::Malformed(name.to_string()))?;
        let (width, height) = (x1 - x0, y1 - y0);

        let on_id = self
            .doc
            .add_object(Object::Stream(checkbox_appearance(width, height, true)));
        let off_id = self
            .doc
            .add_object(Object::Stream(checkbox_appearance(width, height, false)));

        let mut states = Dictionary::new();
        states.set(on_state.to_vec(), Object::Reference(on_id));
        states.set(OFF_STATE.to_vec(), Object::Reference(off_id));
        let mut ap = Dictionary::new();
        ap.set("N", Object::Dictionary(states));

        self.dict_mut(widget, name)?
            .set("AP", Object::Dictionary(ap));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Flattening
    // ------------------------------------------------------------------

    /// Give widgets that have a value but no normal appearance one drawn
    /// from the field's current value, so flattening keeps it visible
    fn draw_missing_appearances(&mut self) {
        for field in self.fields.clone() {
            let bare: Vec<ObjectId> = field
                .widgets
                .iter()
                .copied()
                .filter(|w| {
                    self.dict(*w)
                        .is_some_and(|d| self.normal_appearance(d).is_none())
                })
                .collect();
            if bare.is_empty() {
                continue;
            }

            let drawn = match self.read_value(&field) {
                Some(FieldValue::Text(text)) => self.draw_text(&field, &bare, &text),
                Some(FieldValue::Flag(checked)) => self.draw_checkbox_states(&field, &bare, checked),
                None => Ok(()),
            };
            if let Err(e) = drawn {
                warn!("Could not draw appearance for '{}': {}", field.name, e);
            }
        }
    }

    /// Install missing on/off appearances and set `/AS` from the field value
    fn draw_checkbox_states(
        &mut self,
        field: &FormField,
        widgets: &[ObjectId],
        checked: bool,
    ) -> Result<(), FieldError> {
        let value_state = field
            .value
            .as_ref()
            .and_then(|v| v.as_name().ok())
            .map(<[u8]>::to_vec);

        for &widget in widgets {
            let on = match (&value_state, self.normal_appearance_states(widget)) {
                (_, Some(_)) => self.on_state(widget),
                (Some(v), None) if v.as_slice() != OFF_STATE => v.clone(),
                _ => DEFAULT_ON_STATE.to_vec(),
            };
            if !self.has_state_appearance(widget, &on) {
                self.install_checkbox_appearance(widget, &on, &field.name)?;
            }
            let selected = value_state
                .as_deref()
                .map_or(true, |v| v == on.as_slice());
            let state = if checked && selected {
                on
            } else {
                OFF_STATE.to_vec()
            };
            self.dict_mut(widget, &field.name)?
                .set("AS", Object::Name(state));
        }
        Ok(())
    }

    fn flatten_page(&mut self, page_id: ObjectId) -> Result<usize, FormError> {
        let entries = self.page_annot_entries(page_id);
        if entries.is_empty() {
            return Ok(0);
        }

        let mut kept = Vec::new();
        let mut stamps = Vec::new();
        for entry in entries {
            match self.classify_annot(&entry) {
                AnnotAction::Keep => kept.push(entry),
                AnnotAction::Drop => {}
                AnnotAction::Stamp(stream_id, matrix) => stamps.push((stream_id, matrix)),
            }
        }

        if !stamps.is_empty() {
            let mut resources = self.page_resources(page_id);
            let mut xobjects = resources
                .get(b"XObject")
                .ok()
                .and_then(|o| self.resolve(o))
                .and_then(|o| o.as_dict().ok())
                .cloned()
                .unwrap_or_default();

            let mut ops = b"Q\n".to_vec();
            let mut counter = 0;
            for (stream_id, m) in &stamps {
                let name = loop {
                    counter += 1;
                    let candidate = format!("FlatW{}", counter);
                    if !xobjects.has(candidate.as_bytes()) {
                        break candidate;
                    }
                };
                xobjects.set(name.clone(), Object::Reference(*stream_id));
                ops.extend_from_slice(
                    format!(
                        "q {} {} {} {} {} {} cm /{} Do Q\n",
                        m[0], m[1], m[2], m[3], m[4], m[5], name
                    )
                    .as_bytes(),
                );

                if let Ok(Object::Stream(stream)) = self.doc.get_object_mut(*stream_id) {
                    stream.dict.set("Type", Object::Name(b"XObject".to_vec()));
                    stream.dict.set("Subtype", Object::Name(b"Form".to_vec()));
                }
            }
            resources.set("XObject", Object::Dictionary(xobjects));

            let mut contents = self.page_content_refs(page_id);
            let open_id = self
                .doc
                .add_object(Object::Stream(Stream::new(Dictionary::new(), b"q\n".to_vec())));
            let close_id = self
                .doc
                .add_object(Object::Stream(Stream::new(Dictionary::new(), ops)));
            contents.insert(0, Object::Reference(open_id));
            contents.push(Object::Reference(close_id));

            let page = self.page_dict_mut(page_id)?;
            page.set("Resources", Object::Dictionary(resources));
            page.set("Contents", Object::Array(contents));
        }

        let page = self.page_dict_mut(page_id)?;
        if kept.is_empty() {
            page.remove(b"Annots");
        } else {
            page.set("Annots", Object::Array(kept));
        }

        Ok(stamps.len())
    }

    fn classify_annot(&self, entry: &Object) -> AnnotAction {
        let Some(dict) = self.resolve(entry).and_then(|o| o.as_dict().ok()) else {
            return AnnotAction::Keep;
        };
        let is_widget_annot = dict
            .get(b"Subtype")
            .ok()
            .and_then(|o| o.as_name().ok())
            .is_some_and(|s| s == b"Widget");
        if !is_widget_annot {
            return AnnotAction::Keep;
        }

        let flags = dict.get(b"F").ok().and_then(|o| o.as_i64().ok()).unwrap_or(0);
        if flags & (ANNOT_HIDDEN | ANNOT_NO_VIEW) != 0 {
            return AnnotAction::Drop;
        }

        let (Some(stream_id), Some(rect)) = (
            self.normal_appearance(dict),
            dict.get(b"Rect").ok().and_then(|o| self.rect(o)),
        ) else {
            return AnnotAction::Drop;
        };

        let bbox = match self.doc.get_object(stream_id) {
            Ok(Object::Stream(stream)) => stream.dict.get(b"BBox").ok().and_then(|o| self.rect(o)),
            _ => None,
        };
        AnnotAction::Stamp(stream_id, placement_matrix(rect, bbox))
    }

    /// Normal appearance stream of an annotation, honouring `/AS`
    fn normal_appearance(&self, annot: &Dictionary) -> Option<ObjectId> {
        let ap = annot
            .get(b"AP")
            .ok()
            .and_then(|o| self.resolve(o))
            .and_then(|o| o.as_dict().ok())?;

        let (id, target) = match ap.get(b"N").ok()? {
            Object::Reference(id) => (Some(*id), self.doc.get_object(*id).ok()?),
            other => (None, other),
        };
        match target {
            Object::Stream(_) => id,
            Object::Dictionary(states) => {
                let state = annot.get(b"AS").ok().and_then(|o| o.as_name().ok())?;
                let stream_id = states.get(state).ok()?.as_reference().ok()?;
                matches!(self.doc.get_object(stream_id), Ok(Object::Stream(_))).then_some(stream_id)
            }
            _ => None,
        }
    }

    fn remove_acroform(&mut self) {
        let Some(catalog_id) = self.catalog_id() else {
            return;
        };
        if let Ok(catalog) = self
            .doc
            .get_object_mut(catalog_id)
            .and_then(|o| o.as_dict_mut())
        {
            catalog.remove(b"AcroForm");
        }
    }

    // ------------------------------------------------------------------
    // Object helpers
    // ------------------------------------------------------------------

    fn resolve<'a>(&'a self, obj: &'a Object) -> Option<&'a Object> {
        match obj {
            Object::Reference(id) => self.doc.get_object(*id).ok(),
            other => Some(other),
        }
    }

    fn dict(&self, id: ObjectId) -> Option<&Dictionary> {
        self.doc.get_object(id).ok().and_then(|o| o.as_dict().ok())
    }

    fn dict_mut(&mut self, id: ObjectId, field: &str) -> Result<&mut Dictionary, FieldError> {
        self.doc
            .get_object_mut(id)
            .and_then(|o| o.as_dict_mut())
            .map_err(|_| FieldError::Malformed(field.to_string()))
    }

    fn page_dict_mut(&mut self, page_id: ObjectId) -> Result<&mut Dictionary, FormError> {
        self.doc
            .get_object_mut(page_id)
            .and_then(|o| o.as_dict_mut())
            .map_err(|_| FormError::Malformed(format!("Page {:?} is not a dictionary", page_id)))
    }

    fn catalog_id(&self) -> Option<ObjectId> {
        self.doc
            .trailer
            .get(b"Root")
            .ok()
            .and_then(|o| o.as_reference().ok())
    }

    fn acroform(&self) -> Option<&Dictionary> {
        self.dict(self.catalog_id()?)?
            .get(b"AcroForm")
            .ok()
            .and_then(|o| self.resolve(o))
            .and_then(|o| o.as_dict().ok())
    }

    fn number(&self, obj: &Object) -> Option<f64> {
        match self.resolve(obj)? {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r as f64),
            _ => None,
        }
    }

    fn rect(&self, obj: &Object) -> Option<[f64; 4]> {
        let items = self.resolve(obj)?.as_array().ok()?;
        if items.len() != 4 {
            return None;
        }
        let mut values = [0.0f64; 4];
        for (slot, item) in values.iter_mut().zip(items) {
            *slot = self.number(item)?;
        }
        Some(normalize_rect(values))
    }

    fn page_annot_entries(&self, page_id: ObjectId) -> Vec<Object> {
        self.dict(page_id)
            .and_then(|d| d.get(b"Annots").ok())
            .and_then(|o| self.resolve(o))
            .and_then(|o| o.as_array().ok())
            .cloned()
            .unwrap_or_default()
    }

    fn page_annot_refs(&self, page_id: ObjectId) -> Vec<ObjectId> {
        references(&self.page_annot_entries(page_id))
    }

    fn page_content_refs(&self, page_id: ObjectId) -> Vec<Object> {
        match self.dict(page_id).and_then(|d| d.get(b"Contents").ok()) {
            Some(Object::Reference(id)) => match self.doc.get_object(*id) {
                Ok(Object::Array(items)) => items.clone(),
                _ => vec![Object::Reference(*id)],
            },
            Some(Object::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    }

    /// Page resources, resolved through `/Parent` inheritance
    fn page_resources(&self, page_id: ObjectId) -> Dictionary {
        let mut current = Some(page_id);
        let mut visited = BTreeSet::new();
        while let Some(id) = current {
            if !visited.insert(id) {
                break;
            }
            let Some(dict) = self.dict(id) else {
                break;
            };
            if let Some(resources) = dict
                .get(b"Resources")
                .ok()
                .and_then(|o| self.resolve(o))
                .and_then(|o| o.as_dict().ok())
            {
                return resources.clone();
            }
            current = dict.get(b"Parent").ok().and_then(|o| o.as_reference().ok());
        }
        Dictionary::new()
    }
}

#[cfg(test)]
impl FormDocument {
    /// Serialize without flattening, for inspecting edits in tests
    pub(crate) fn into_editable_bytes(mut self) -> Vec<u8> {
        let mut buffer = Vec::new();
        self.doc.save_to(&mut buffer).unwrap();
        buffer
    }
}

/// Completed document with no interactive fields left
pub struct FlattenedDocument {
    doc: Document,
}

impl FlattenedDocument {
    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Serialize the final document
    pub fn into_bytes(mut self) -> Result<Vec<u8>, FormError> {
        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| FormError::Serialization(e.to_string()))?;
        Ok(buffer)
    }
}

/// Decrypt a document whose user password is empty.
///
/// `Document::decrypt` only handles top-level strings and streams, so strings
/// nested in dictionaries and arrays (field names, values) are decrypted here
/// with the key of the object that owns them.
fn decrypt_with_empty_password(doc: &mut Document) -> Result<(), lopdf::Error> {
    let encrypt_id = doc.trailer.get(b"Encrypt").and_then(Object::as_reference).ok();
    let info_id = doc.trailer.get(b"Info").and_then(Object::as_reference).ok();
    let key = encryption::get_encryption_key(doc, "", true)?;

    doc.decrypt("")?;

    for (&id, object) in doc.objects.iter_mut() {
        // The info dictionary's entries are already handled by `decrypt`
        if Some(id) == encrypt_id || Some(id) == info_id {
            continue;
        }
        crypt_nested_strings(&key, id, object);
    }
    Ok(())
}

/// RC4-transform every string nested inside `object`, leaving a top-level
/// string or stream body untouched. The transform is its own inverse.
pub(crate) fn crypt_nested_strings(key: &[u8], id: ObjectId, object: &mut Object) {
    match object {
        Object::Array(items) => {
            for item in items {
                crypt_string_tree(key, id, item);
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                crypt_string_tree(key, id, value);
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter_mut() {
                crypt_string_tree(key, id, value);
            }
        }
        _ => {}
    }
}

fn crypt_string_tree(key: &[u8], id: ObjectId, object: &mut Object) {
    if matches!(object, Object::String(..)) {
        if let Ok(plain) = encryption::decrypt_object(key, id, object) {
            if let Object::String(bytes, _) = object {
                *bytes = plain;
            }
        }
    } else {
        crypt_nested_strings(key, id, object);
    }
}

fn references(items: &[Object]) -> Vec<ObjectId> {
    items
        .iter()
        .filter_map(|o| o.as_reference().ok())
        .collect()
}

fn is_widget(dict: &Dictionary) -> bool {
    let subtype_widget = dict
        .get(b"Subtype")
        .ok()
        .and_then(|o| o.as_name().ok())
        .is_some_and(|s| s == b"Widget");
    subtype_widget || dict.has(b"Rect")
}

/// Matrix mapping an appearance `/BBox` onto a widget `/Rect`
fn placement_matrix(rect: [f64; 4], bbox: Option<[f64; 4]>) -> [f64; 6] {
    let [rx0, ry0, rx1, ry1] = rect;
    let [bx0, by0, bx1, by1] = bbox.unwrap_or([0.0, 0.0, rx1 - rx0, ry1 - ry0]);
    let (bw, bh) = (bx1 - bx0, by1 - by0);
    let sx = if bw.abs() > f64::EPSILON { (rx1 - rx0) / bw } else { 1.0 };
    let sy = if bh.abs() > f64::EPSILON { (ry1 - ry0) / bh } else { 1.0 };
    [sx, 0.0, 0.0, sy, rx0 - bx0 * sx, ry0 - by0 * sy]
}
