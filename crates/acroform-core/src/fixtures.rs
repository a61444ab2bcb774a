//! In-memory PDF forms for tests
//!
//! Builds small documents with AcroForm fields using lopdf directly, so
//! tests never depend on files on disk.

use lopdf::{encryption, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use crate::appearance::checkbox_appearance;
use crate::document::crypt_nested_strings;

/// Password padding string from the standard security handler
const PASSWORD_PAD: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// Builder for a letter-sized document with form fields
pub struct FixtureBuilder {
    doc: Document,
    pages_id: ObjectId,
    page_ids: Vec<ObjectId>,
    page_annots: Vec<Vec<Object>>,
    fields: Vec<Object>,
    page_refs: bool,
    owner_password_only: bool,
}

fn rect_object(rect: [f64; 4]) -> Object {
    Object::Array(rect.iter().map(|v| Object::Real(*v as f32)).collect())
}

fn literal(s: &str) -> Object {
    Object::String(s.as_bytes().to_vec(), StringFormat::Literal)
}

impl FixtureBuilder {
    pub fn new(page_count: u32) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_ids = (0..page_count).map(|_| doc.new_object_id()).collect();

        Self {
            doc,
            pages_id,
            page_ids,
            page_annots: vec![Vec::new(); page_count as usize],
            fields: Vec::new(),
            page_refs: true,
            owner_password_only: false,
        }
    }

    /// Leave `/P` off widgets added after this call
    pub fn omit_page_refs(mut self) -> Self {
        self.page_refs = false;
        self
    }

    /// Encrypt the output with RC4-40 (revision 2), an empty user password
    /// and a non-empty owner password
    pub fn owner_password_only(mut self) -> Self {
        self.owner_password_only = true;
        self
    }

    fn widget_dict(&self, page: Option<u32>, rect: [f64; 4]) -> Dictionary {
        let mut widget = Dictionary::new();
        widget.set("Type", Object::Name(b"Annot".to_vec()));
        widget.set("Subtype", Object::Name(b"Widget".to_vec()));
        widget.set("Rect", rect_object(rect));
        widget.set("F", Object::Integer(4));
        if let Some(page) = page {
            if self.page_refs {
                widget.set("P", Object::Reference(self.page_ids[page as usize - 1]));
            }
        }
        widget
    }

    fn place(&mut self, page: u32, widget_id: ObjectId) {
        self.page_annots[page as usize - 1].push(Object::Reference(widget_id));
    }

    /// Merged field/widget text field
    pub fn text_field(mut self, name: &str, page: u32, rect: [f64; 4], value: Option<&str>) -> Self {
        let mut dict = self.widget_dict(Some(page), rect);
        dict.set("FT", Object::Name(b"Tx".to_vec()));
        dict.set("T", literal(name));
        dict.set("DA", literal("/Helv 0 Tf 0 g"));
        if let Some(value) = value {
            dict.set("V", literal(value));
        }
        let id = self.doc.add_object(Object::Dictionary(dict));
        self.place(page, id);
        self.fields.push(Object::Reference(id));
        self
    }

    /// Checkbox with `/Yes` and `/Off` appearances
    pub fn checkbox(mut self, name: &str, page: u32, rect: [f64; 4], checked: bool) -> Self {
        let (w, h) = (rect[2] - rect[0], rect[3] - rect[1]);
        let on_id = self
            .doc
            .add_object(Object::Stream(checkbox_appearance(w, h, true)));
        let off_id = self
            .doc
            .add_object(Object::Stream(checkbox_appearance(w, h, false)));
        let mut states = Dictionary::new();
        states.set("Yes", Object::Reference(on_id));
        states.set("Off", Object::Reference(off_id));
        let mut ap = Dictionary::new();
        ap.set("N", Object::Dictionary(states));

        let state: &[u8] = if checked { b"Yes" } else { b"Off" };
        let mut dict = self.widget_dict(Some(page), rect);
        dict.set("FT", Object::Name(b"Btn".to_vec()));
        dict.set("T", literal(name));
        dict.set("V", Object::Name(state.to_vec()));
        dict.set("AS", Object::Name(state.to_vec()));
        dict.set("AP", Object::Dictionary(ap));
        let id = self.doc.add_object(Object::Dictionary(dict));
        self.place(page, id);
        self.fields.push(Object::Reference(id));
        self
    }

    pub fn choice_field(
        mut self,
        name: &str,
        page: u32,
        rect: [f64; 4],
        options: &[&str],
        value: Option<&str>,
    ) -> Self {
        let mut dict = self.widget_dict(Some(page), rect);
        dict.set("FT", Object::Name(b"Ch".to_vec()));
        dict.set("T", literal(name));
        dict.set("Ff", Object::Integer(1 << 17));
        dict.set(
            "Opt",
            Object::Array(options.iter().map(|o| literal(o)).collect()),
        );
        if let Some(value) = value {
            dict.set("V", literal(value));
        }
        let id = self.doc.add_object(Object::Dictionary(dict));
        self.place(page, id);
        self.fields.push(Object::Reference(id));
        self
    }

    /// Parent field whose unnamed kids are its widgets
    pub fn multi_widget_text_field(mut self, name: &str, widgets: &[(u32, [f64; 4])]) -> Self {
        let parent_id = self.doc.new_object_id();
        let mut kids = Vec::new();
        for (page, rect) in widgets {
            let mut widget = self.widget_dict(Some(*page), *rect);
            widget.set("Parent", Object::Reference(parent_id));
            let id = self.doc.add_object(Object::Dictionary(widget));
            self.place(*page, id);
            kids.push(Object::Reference(id));
        }

        let mut parent = Dictionary::new();
        parent.set("FT", Object::Name(b"Tx".to_vec()));
        parent.set("T", literal(name));
        parent.set("Kids", Object::Array(kids));
        self.doc.objects.insert(parent_id, Object::Dictionary(parent));
        self.fields.push(Object::Reference(parent_id));
        self
    }

    /// `parent.child` text field with the type inherited from the parent
    pub fn nested_text_field(mut self, parent: &str, child: &str, page: u32, rect: [f64; 4]) -> Self {
        let parent_id = self.doc.new_object_id();
        let mut kid = self.widget_dict(Some(page), rect);
        kid.set("T", literal(child));
        kid.set("Parent", Object::Reference(parent_id));
        let kid_id = self.doc.add_object(Object::Dictionary(kid));
        self.place(page, kid_id);

        let mut dict = Dictionary::new();
        dict.set("FT", Object::Name(b"Tx".to_vec()));
        dict.set("T", literal(parent));
        dict.set("Kids", Object::Array(vec![Object::Reference(kid_id)]));
        self.doc.objects.insert(parent_id, Object::Dictionary(dict));
        self.fields.push(Object::Reference(parent_id));
        self
    }

    /// Text field whose widget sits on no page's `/Annots` and has no `/P`
    pub fn orphan_text_field(mut self, name: &str, rect: [f64; 4]) -> Self {
        let mut dict = self.widget_dict(None, rect);
        dict.set("FT", Object::Name(b"Tx".to_vec()));
        dict.set("T", literal(name));
        let id = self.doc.add_object(Object::Dictionary(dict));
        self.fields.push(Object::Reference(id));
        self
    }

    /// Named field with neither a `/Rect` nor widget kids
    pub fn widgetless_field(mut self, name: &str) -> Self {
        let mut dict = Dictionary::new();
        dict.set("FT", Object::Name(b"Tx".to_vec()));
        dict.set("T", literal(name));
        let id = self.doc.add_object(Object::Dictionary(dict));
        self.fields.push(Object::Reference(id));
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        let page_ids = self.page_ids.clone();
        for (index, page_id) in page_ids.iter().enumerate() {
            let content = format!("BT /F1 12 Tf 50 750 Td (Page {}) Tj ET", index + 1);
            let content_id = self.doc.add_object(Object::Stream(Stream::new(
                Dictionary::new(),
                content.into_bytes(),
            )));

            let mut page = Dictionary::new();
            page.set("Type", Object::Name(b"Page".to_vec()));
            page.set("Parent", Object::Reference(self.pages_id));
            page.set("Contents", Object::Reference(content_id));
            page.set(
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(612),
                    Object::Integer(792),
                ]),
            );
            let annots = std::mem::take(&mut self.page_annots[index]);
            if !annots.is_empty() {
                page.set("Annots", Object::Array(annots));
            }
            self.doc.objects.insert(*page_id, Object::Dictionary(page));
        }

        let mut font = Dictionary::new();
        font.set("Type", Object::Name(b"Font".to_vec()));
        font.set("Subtype", Object::Name(b"Type1".to_vec()));
        font.set("BaseFont", Object::Name(b"Helvetica".to_vec()));
        let mut fonts = Dictionary::new();
        fonts.set("F1", Object::Dictionary(font));
        let mut resources = Dictionary::new();
        resources.set("Font", Object::Dictionary(fonts));

        let mut pages = Dictionary::new();
        pages.set("Type", Object::Name(b"Pages".to_vec()));
        pages.set("Count", Object::Integer(page_ids.len() as i64));
        pages.set(
            "Kids",
            Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
        );
        pages.set("Resources", Object::Dictionary(resources));
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(self.pages_id));
        if !self.fields.is_empty() {
            let mut acroform = Dictionary::new();
            acroform.set("Fields", Object::Array(std::mem::take(&mut self.fields)));
            acroform.set("DA", literal("/Helv 0 Tf 0 g"));
            let acroform_id = self.doc.add_object(Object::Dictionary(acroform));
            catalog.set("AcroForm", Object::Reference(acroform_id));
        }
        let catalog_id = self.doc.add_object(Object::Dictionary(catalog));
        self.doc.trailer.set("Root", Object::Reference(catalog_id));

        if self.owner_password_only {
            self.encrypt();
        }

        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .expect("fixture document should serialize");
        buffer
    }

    fn encrypt(&mut self) {
        let file_id = Object::String(b"acroform-fixture".to_vec(), StringFormat::Hexadecimal);
        self.doc
            .trailer
            .set("ID", Object::Array(vec![file_id.clone(), file_id]));

        let mut handler = Dictionary::new();
        handler.set("Filter", Object::Name(b"Standard".to_vec()));
        handler.set("V", Object::Integer(1));
        handler.set("R", Object::Integer(2));
        handler.set("Length", Object::Integer(40));
        handler.set("P", Object::Integer(-44));
        // Owner hash for any owner password; only the user password is checked
        handler.set(
            "O",
            Object::String(rc4(b"owner", &PASSWORD_PAD), StringFormat::Hexadecimal),
        );
        let handler_id = self.doc.add_object(Object::Dictionary(handler));
        self.doc.trailer.set("Encrypt", Object::Reference(handler_id));

        let key = encryption::get_encryption_key(&self.doc, "", false)
            .expect("fixture encryption key");
        if let Ok(Object::Dictionary(handler)) = self.doc.get_object_mut(handler_id) {
            handler.set(
                "U",
                Object::String(rc4(&key, &PASSWORD_PAD), StringFormat::Hexadecimal),
            );
        }

        for (&id, object) in self.doc.objects.iter_mut() {
            if id == handler_id {
                continue;
            }
            crypt_nested_strings(&key, id, object);
            if let Ok(cipher) = encryption::decrypt_object(&key, id, object) {
                match object {
                    Object::String(bytes, _) => *bytes = cipher,
                    Object::Stream(stream) => stream.set_content(cipher),
                    _ => {}
                }
            }
        }
    }
}

fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut state: Vec<u8> = (0..=255).collect();
    let mut j = 0u8;
    for i in 0..256 {
        j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
        state.swap(i, j as usize);
    }

    let (mut i, mut j) = (0u8, 0u8);
    data.iter()
        .map(|byte| {
            i = i.wrapping_add(1);
            j = j.wrapping_add(state[i as usize]);
            state.swap(i as usize, j as usize);
            let k = state[state[i as usize].wrapping_add(state[j as usize]) as usize];
            byte ^ k
        })
        .collect()
}
