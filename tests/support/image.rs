//! Writes minimal managed PE images for tests
//!
//! The output is a PE32 file with one `.text` section holding a CLI header,
//! tiny/fat IL method bodies and a metadata root with the `#~`, `#Strings`,
//! `#US`, `#GUID` and `#Blob` streams. Only the tables the probe reads are
//! emitted. `System.Guid`, `System.Object` and `System.Environment` are
//! referenced from an assembly reference to `System.Runtime`.
//!
//! Switches on [`ImageBuilder`] produce the rarer layouts: a PE32+ header,
//! an uncompressed `#-` stream whose Field, MethodDef and Property rows are
//! stored in reverse and reached through pointer tables, and 4-byte heap
//! indexes.

use std::collections::HashMap;

const TEXT_RVA: u32 = 0x2000;
const TEXT_RAW_OFFSET: usize = 0x200;
const CLI_HEADER_SIZE: usize = 72;

const TYPE_REF_GUID: u32 = 1;
const TYPE_REF_OBJECT: u32 = 2;
const TYPE_REF_ENVIRONMENT: u32 = 3;

const MEMBER_REF_GUID_CTOR_STRING: u32 = 1;
const MEMBER_REF_GUID_CTOR_PARTS: u32 = 2;
const MEMBER_REF_GUID_PARSE: u32 = 3;
const MEMBER_REF_MACHINE_NAME: u32 = 4;

const FIELD_PUBLIC_STATIC: u16 = 0x0016;
const FIELD_PRIVATE_STATIC: u16 = 0x0011;
const FIELD_PUBLIC_INSTANCE: u16 = 0x0006;
const FIELD_LITERAL: u16 = 0x0040 | 0x8000;

const METHOD_PUBLIC_STATIC: u16 = 0x0096;
const METHOD_PRIVATE_STATIC: u16 = 0x0091;
const METHOD_PUBLIC_INSTANCE: u16 = 0x0086;
const METHOD_SPECIAL_NAME: u16 = 0x0800;
const METHOD_CCTOR: u16 = 0x1811;

/// Types that can appear in field, property and getter signatures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ty {
    Guid,
    String,
    I4,
    Bool,
    Object,
}

impl Ty {
    fn encode(self, out: &mut Vec<u8>) {
        match self {
            Ty::Guid => {
                out.push(0x11);
                out.push(((TYPE_REF_GUID << 2) | 1) as u8);
            }
            Ty::String => out.push(0x0E),
            Ty::I4 => out.push(0x08),
            Ty::Bool => out.push(0x02),
            Ty::Object => out.push(0x1C),
        }
    }
}

/// Values stored in the Constant table
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    String(String),
    I4(i32),
    Bool(bool),
    Null,
}

impl Constant {
    fn encode(&self) -> (u8, Vec<u8>) {
        match self {
            Constant::String(text) => (
                0x0E,
                text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect(),
            ),
            Constant::I4(v) => (0x08, v.to_le_bytes().to_vec()),
            Constant::Bool(v) => (0x02, vec![u8::from(*v)]),
            Constant::Null => (0x12, vec![0, 0, 0, 0]),
        }
    }
}

/// Symbolic IL; tokens are filled in when the image is written
#[derive(Debug, Clone, PartialEq)]
pub enum Il {
    Nop,
    Ldnull,
    LdcI4(i32),
    Ldstr(String),
    Dup,
    Pop,
    Stloc0,
    Ldloc0,
    /// Static field of the declaring type, by name
    Stsfld(String),
    Ldsfld(String),
    /// `newobj System.Guid::.ctor(string)`
    NewGuidFromString,
    /// `newobj System.Guid::.ctor(int32, int16, int16, uint8 x 8)`
    NewGuidFromParts,
    /// `call System.Guid::Parse(string)`
    CallGuidParse,
    /// `call System.Environment::get_MachineName()`
    CallMachineName,
    /// `br.s` to the next instruction
    Branch,
    Ret,
}

impl Il {
    pub fn ldstr(text: &str) -> Il {
        Il::Ldstr(text.to_string())
    }

    pub fn stsfld(name: &str) -> Il {
        Il::Stsfld(name.to_string())
    }

    pub fn ldsfld(name: &str) -> Il {
        Il::Ldsfld(name.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    name: String,
    flags: u16,
    ty: Ty,
    constant: Option<Constant>,
}

impl FieldDef {
    pub fn public_static(name: &str, ty: Ty) -> Self {
        Self {
            name: name.to_string(),
            flags: FIELD_PUBLIC_STATIC,
            ty,
            constant: None,
        }
    }

    pub fn private_static(name: &str, ty: Ty) -> Self {
        Self {
            flags: FIELD_PRIVATE_STATIC,
            ..Self::public_static(name, ty)
        }
    }

    pub fn public_instance(name: &str, ty: Ty) -> Self {
        Self {
            flags: FIELD_PUBLIC_INSTANCE,
            ..Self::public_static(name, ty)
        }
    }

    /// A `public const` field
    pub fn literal(name: &str, ty: Ty, value: Constant) -> Self {
        Self {
            flags: FIELD_PUBLIC_STATIC | FIELD_LITERAL,
            constant: Some(value),
            ..Self::public_static(name, ty)
        }
    }
}

#[derive(Debug, Clone)]
struct MethodDef {
    name: String,
    flags: u16,
    signature: Vec<u8>,
    body: Vec<Il>,
}

#[derive(Debug, Clone)]
pub struct PropertyDef {
    name: String,
    ty: Ty,
    getter_flags: u16,
    getter: Vec<Il>,
}

impl PropertyDef {
    /// A property with a `public static` getter
    pub fn public_static(name: &str, ty: Ty, getter: Vec<Il>) -> Self {
        Self {
            name: name.to_string(),
            ty,
            getter_flags: METHOD_PUBLIC_STATIC | METHOD_SPECIAL_NAME,
            getter,
        }
    }

    pub fn private_static(name: &str, ty: Ty, getter: Vec<Il>) -> Self {
        Self {
            getter_flags: METHOD_PRIVATE_STATIC | METHOD_SPECIAL_NAME,
            ..Self::public_static(name, ty, getter)
        }
    }

    pub fn public_instance(name: &str, ty: Ty, getter: Vec<Il>) -> Self {
        Self {
            getter_flags: METHOD_PUBLIC_INSTANCE | METHOD_SPECIAL_NAME,
            ..Self::public_static(name, ty, getter)
        }
    }
}

#[derive(Debug, Clone)]
pub struct TypeDef {
    namespace: String,
    name: String,
    enclosing: Option<String>,
    fields: Vec<FieldDef>,
    methods: Vec<MethodDef>,
    properties: Vec<PropertyDef>,
}

impl TypeDef {
    pub fn class(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            enclosing: None,
            fields: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// A class nested in the type whose full name is `enclosing`
    pub fn nested(name: &str, enclosing: &str) -> Self {
        Self {
            enclosing: Some(enclosing.to_string()),
            ..Self::class("", name)
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    pub fn static_constructor(mut self, body: Vec<Il>) -> Self {
        self.methods.push(MethodDef {
            name: ".cctor".to_string(),
            flags: METHOD_CCTOR,
            signature: vec![0x00, 0x00, 0x01],
            body,
        });
        self
    }

    fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

/// Builds a managed image from a list of type definitions
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    module_name: String,
    types: Vec<TypeDef>,
    pe32_plus: bool,
    pointer_tables: bool,
    wide_heaps: bool,
}

impl ImageBuilder {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            types: Vec::new(),
            pe32_plus: false,
            pointer_tables: false,
            wide_heaps: false,
        }
    }

    pub fn with_type(mut self, ty: TypeDef) -> Self {
        self.types.push(ty);
        self
    }

    /// Writes a PE32+ (x64) optional header instead of PE32
    pub fn pe32_plus(mut self) -> Self {
        self.pe32_plus = true;
        self
    }

    /// Writes a `#-` stream with FieldPtr, MethodPtr and PropertyPtr tables.
    ///
    /// The physical Field, MethodDef and Property rows are stored in reverse
    /// declaration order, so only the pointer tables map list positions to rows.
    pub fn with_pointer_tables(mut self) -> Self {
        self.pointer_tables = true;
        self
    }

    /// Sets every HeapSizes bit, making `#Strings`, `#GUID` and `#Blob` indexes 4 bytes
    pub fn with_wide_heap_indexes(mut self) -> Self {
        self.wide_heaps = true;
        self
    }

    /// Physical row of the `logical`-th entry of a list table with `count` rows
    fn place(&self, logical: u32, count: u32) -> u32 {
        if self.pointer_tables {
            count + 1 - logical
        } else {
            logical
        }
    }

    /// Rows in declaration order, rearranged into physical order
    fn physical<T>(&self, mut rows: Vec<T>) -> Vec<T> {
        if self.pointer_tables {
            rows.reverse();
        }
        rows
    }

    pub fn build(&self) -> Vec<u8> {
        let mut types = vec![TypeDef::class("", "<Module>")];
        types.extend(self.types.iter().cloned());
        for ty in &mut types {
            let getters: Vec<MethodDef> = ty
                .properties
                .iter()
                .map(|p| {
                    let mut signature = vec![if p.getter_flags & 0x0010 != 0 { 0x00 } else { 0x20 }, 0x00];
                    p.ty.encode(&mut signature);
                    MethodDef {
                        name: format!("get_{}", p.name),
                        flags: p.getter_flags,
                        signature,
                        body: p.getter.clone(),
                    }
                })
                .collect();
            ty.methods.extend(getters);
        }

        let field_count: u32 = types.iter().map(|t| t.fields.len() as u32).sum();
        let method_count: u32 = types.iter().map(|t| t.methods.len() as u32).sum();
        let property_count: u32 = types.iter().map(|t| t.properties.len() as u32).sum();

        // Heap index widths
        let wide = if self.wide_heaps { 4 } else { 2 };
        let (s, g, b) = (wide, wide, wide);

        let mut heaps = Heaps::new();
        let mut tables = TableWriter::default();

        // Module
        let module_name = heaps.string(&self.module_name);
        tables.row(0x00, &[2, s, g, g, g], &[0, module_name, 1, 0, 0]);

        // TypeRef, scoped to AssemblyRef 1
        let scope = (1 << 2) | 2;
        for (namespace, name) in [("System", "Guid"), ("System", "Object"), ("System", "Environment")] {
            let name = heaps.string(name);
            let namespace = heaps.string(namespace);
            tables.row(0x01, &[2, s, s], &[scope, name, namespace]);
        }

        // List positions (declaration order) for every type, and the physical
        // Field row behind each field name
        let mut field_rows: Vec<HashMap<String, u32>> = Vec::new();
        let mut next_field = 1u32;
        let mut next_method = 1u32;
        let mut type_lists = Vec::new();
        for ty in &types {
            type_lists.push((next_field, next_method));
            let mut rows = HashMap::new();
            for field in &ty.fields {
                rows.insert(field.name.clone(), self.place(next_field, field_count));
                next_field += 1;
            }
            field_rows.push(rows);
            next_method += ty.methods.len() as u32;
        }

        // TypeDef
        for (index, ty) in types.iter().enumerate() {
            let (flags, extends) = match (index, &ty.enclosing) {
                (0, _) => (0, 0),
                (_, Some(_)) => (0x0000_0002, (TYPE_REF_OBJECT << 2) | 1),
                (_, None) => (0x0010_0001, (TYPE_REF_OBJECT << 2) | 1),
            };
            let name = heaps.string(&ty.name);
            let namespace = heaps.string(&ty.namespace);
            let (field_list, method_list) = type_lists[index];
            tables.row(
                0x02,
                &[4, s, s, 2, 2, 2],
                &[flags, name, namespace, extends, field_list, method_list],
            );
        }

        // FieldPtr, MethodPtr
        if self.pointer_tables {
            for logical in 1..=field_count {
                tables.row(0x03, &[2], &[self.place(logical, field_count)]);
            }
            for logical in 1..=method_count {
                tables.row(0x05, &[2], &[self.place(logical, method_count)]);
            }
        }

        // Field and Constant
        let mut constants = Vec::new();
        let mut field_table = Vec::new();
        let mut logical_field = 0u32;
        for ty in &types {
            for field in &ty.fields {
                logical_field += 1;
                let mut signature = vec![0x06];
                field.ty.encode(&mut signature);
                let name = heaps.string(&field.name);
                let signature = heaps.blob(&signature);
                field_table.push([u32::from(field.flags), name, signature]);
                if let Some(constant) = &field.constant {
                    let (element_type, value) = constant.encode();
                    let parent = self.place(logical_field, field_count) << 2;
                    constants.push((u32::from(element_type), parent, heaps.blob(&value)));
                }
            }
        }
        for row in self.physical(field_table) {
            tables.row(0x04, &[2, s, b], &row);
        }

        // Method bodies; the CLI header is followed directly by the code
        let mut code = Vec::new();
        let mut method_rvas = Vec::new();
        for (index, ty) in types.iter().enumerate() {
            for method in &ty.methods {
                while code.len() % 4 != 0 {
                    code.push(0);
                }
                method_rvas.push(TEXT_RVA + (CLI_HEADER_SIZE + code.len()) as u32);
                let il = encode_il(&method.body, &field_rows[index], &mut heaps);
                code.extend(method_header(il.len()));
                code.extend(il);
            }
        }

        // MethodDef
        let mut method_table = Vec::new();
        for method in types.iter().flat_map(|t| &t.methods) {
            let name = heaps.string(&method.name);
            let signature = heaps.blob(&method.signature);
            let rva = method_rvas[method_table.len()];
            method_table.push([rva, 0, u32::from(method.flags), name, signature, 1]);
        }
        for row in self.physical(method_table) {
            tables.row(0x06, &[4, 2, 2, s, b, 2], &row);
        }

        // MemberRef on System.Guid and System.Environment
        let guid_parent = (TYPE_REF_GUID << 3) | 1;
        let environment_parent = (TYPE_REF_ENVIRONMENT << 3) | 1;
        let guid_value = [0x11, ((TYPE_REF_GUID << 2) | 1) as u8];
        let mut parts = vec![0x20, 11, 0x01, 0x08, 0x06, 0x06];
        parts.extend([0x05; 8]);
        let mut parse = vec![0x00, 1];
        parse.extend(guid_value);
        parse.push(0x0E);
        let member_refs: [(u32, &str, Vec<u8>); 4] = [
            (guid_parent, ".ctor", vec![0x20, 1, 0x01, 0x0E]),
            (guid_parent, ".ctor", parts),
            (guid_parent, "Parse", parse),
            (environment_parent, "get_MachineName", vec![0x00, 0, 0x0E]),
        ];
        for (parent, name, signature) in member_refs {
            let name = heaps.string(name);
            let signature = heaps.blob(&signature);
            tables.row(0x0A, &[2, s, b], &[parent, name, signature]);
        }

        // Constant, sorted by parent
        constants.sort_by_key(|c| c.1);
        for (element_type, parent, value) in constants {
            tables.row(0x0B, &[2, 2, b], &[element_type, parent, value]);
        }

        // PropertyMap, PropertyPtr, Property and MethodSemantics
        let mut logical_property = 0u32;
        let mut property_table = Vec::new();
        let mut semantics = Vec::new();
        for (index, ty) in types.iter().enumerate() {
            if ty.properties.is_empty() {
                continue;
            }
            tables.row(0x15, &[2, 2], &[index as u32 + 1, logical_property + 1]);
            let first_getter = type_lists[index].1 + (ty.methods.len() - ty.properties.len()) as u32;
            for (offset, property) in ty.properties.iter().enumerate() {
                logical_property += 1;
                let mut signature = vec![0x08, 0x00];
                property.ty.encode(&mut signature);
                let name = heaps.string(&property.name);
                let signature = heaps.blob(&signature);
                property_table.push([0, name, signature]);
                let getter = self.place(first_getter + offset as u32, method_count);
                let association = (self.place(logical_property, property_count) << 1) | 1;
                semantics.push((getter, association));
            }
        }
        if self.pointer_tables {
            for logical in 1..=property_count {
                tables.row(0x16, &[2], &[self.place(logical, property_count)]);
            }
        }
        for row in self.physical(property_table) {
            tables.row(0x17, &[2, s, b], &row);
        }
        semantics.sort_by_key(|(_, association)| *association);
        for (getter, association) in semantics {
            tables.row(0x18, &[2, 2, 2], &[0x0002, getter, association]);
        }

        // AssemblyRef System.Runtime
        let runtime = heaps.string("System.Runtime");
        tables.row(
            0x23,
            &[2, 2, 2, 2, 4, b, s, s, b],
            &[8, 0, 0, 0, 0, 0, runtime, 0, 0],
        );

        // NestedClass
        for (index, ty) in types.iter().enumerate() {
            let Some(enclosing) = &ty.enclosing else {
                continue;
            };
            let outer = types
                .iter()
                .position(|t| t.full_name() == *enclosing)
                .unwrap_or_else(|| panic!("enclosing type {} is not defined", enclosing));
            tables.row(0x29, &[2, 2], &[index as u32 + 1, outer as u32 + 1]);
        }

        let heap_sizes = if self.wide_heaps { 0x07 } else { 0x00 };
        let table_stream = if self.pointer_tables { "#-" } else { "#~" };
        let metadata = metadata_root(table_stream, &tables.finish(heap_sizes), &heaps);
        pe_image(&code, &metadata, self.pe32_plus)
    }
}

fn method_header(code_size: usize) -> Vec<u8> {
    if code_size < 64 {
        return vec![((code_size as u8) << 2) | 0x02];
    }
    let mut header = Vec::with_capacity(12);
    header.extend(0x3003u16.to_le_bytes());
    header.extend(8u16.to_le_bytes());
    header.extend((code_size as u32).to_le_bytes());
    header.extend(0u32.to_le_bytes());
    header
}

fn encode_il(body: &[Il], fields: &HashMap<String, u32>, heaps: &mut Heaps) -> Vec<u8> {
    let field_token = |name: &String| -> [u8; 4] {
        let row = fields
            .get(name)
            .unwrap_or_else(|| panic!("field {} is not declared on this type", name));
        (0x0400_0000 | row).to_le_bytes()
    };
    let member_ref = |row: u32| (0x0A00_0000 | row).to_le_bytes();

    let mut out = Vec::new();
    for instruction in body {
        match instruction {
            Il::Nop => out.push(0x00),
            Il::Ldnull => out.push(0x14),
            Il::LdcI4(v) => {
                out.push(0x20);
                out.extend(v.to_le_bytes());
            }
            Il::Ldstr(text) => {
                out.push(0x72);
                out.extend((0x7000_0000 | heaps.user_string(text)).to_le_bytes());
            }
            Il::Dup => out.push(0x25),
            Il::Pop => out.push(0x26),
            Il::Stloc0 => out.push(0x0A),
            Il::Ldloc0 => out.push(0x06),
            Il::Stsfld(name) => {
                out.push(0x80);
                out.extend(field_token(name));
            }
            Il::Ldsfld(name) => {
                out.push(0x7E);
                out.extend(field_token(name));
            }
            Il::NewGuidFromString => {
                out.push(0x73);
                out.extend(member_ref(MEMBER_REF_GUID_CTOR_STRING));
            }
            Il::NewGuidFromParts => {
                out.push(0x73);
                out.extend(member_ref(MEMBER_REF_GUID_CTOR_PARTS));
            }
            Il::CallGuidParse => {
                out.push(0x28);
                out.extend(member_ref(MEMBER_REF_GUID_PARSE));
            }
            Il::CallMachineName => {
                out.push(0x28);
                out.extend(member_ref(MEMBER_REF_MACHINE_NAME));
            }
            Il::Branch => out.extend([0x2B, 0x00]),
            Il::Ret => out.push(0x2A),
        }
    }
    out
}

struct Heaps {
    strings: Vec<u8>,
    string_offsets: HashMap<String, u32>,
    blobs: Vec<u8>,
    user_strings: Vec<u8>,
}

impl Heaps {
    fn new() -> Self {
        Self {
            strings: vec![0],
            string_offsets: HashMap::new(),
            blobs: vec![0],
            user_strings: vec![0],
        }
    }

    fn string(&mut self, value: &str) -> u32 {
        if value.is_empty() {
            return 0;
        }
        if let Some(offset) = self.string_offsets.get(value) {
            return *offset;
        }
        let offset = self.strings.len() as u32;
        self.strings.extend(value.as_bytes());
        self.strings.push(0);
        self.string_offsets.insert(value.to_string(), offset);
        offset
    }

    fn blob(&mut self, value: &[u8]) -> u32 {
        let offset = self.blobs.len() as u32;
        compressed(&mut self.blobs, value.len() as u32);
        self.blobs.extend(value);
        offset
    }

    fn user_string(&mut self, value: &str) -> u32 {
        let offset = self.user_strings.len() as u32;
        let units: Vec<u8> = value.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        compressed(&mut self.user_strings, units.len() as u32 + 1);
        self.user_strings.extend(units);
        self.user_strings.push(0);
        offset
    }
}

fn compressed(out: &mut Vec<u8>, value: u32) {
    if value < 0x80 {
        out.push(value as u8);
    } else if value < 0x4000 {
        out.extend((0x8000 | value as u16).to_be_bytes());
    } else {
        out.extend((0xC000_0000 | value).to_be_bytes());
    }
}

/// Collects rows per table; every column is written at the given width
#[derive(Default)]
struct TableWriter {
    tables: Vec<(u8, Vec<u8>, u32)>,
}

impl TableWriter {
    fn row(&mut self, table: u8, widths: &[usize], values: &[u32]) {
        let slot = match self.tables.iter().position(|(id, _, _)| *id == table) {
            Some(slot) => slot,
            None => {
                self.tables.push((table, Vec::new(), 0));
                self.tables.len() - 1
            }
        };
        let (_, data, rows) = &mut self.tables[slot];
        for (width, value) in widths.iter().zip(values) {
            match width {
                2 => data.extend((*value as u16).to_le_bytes()),
                _ => data.extend(value.to_le_bytes()),
            }
        }
        *rows += 1;
    }

    fn finish(mut self, heap_sizes: u8) -> Vec<u8> {
        self.tables.sort_by_key(|(id, _, _)| *id);
        let valid = self
            .tables
            .iter()
            .fold(0u64, |mask, (id, _, _)| mask | (1u64 << id));

        let mut out = Vec::new();
        out.extend(0u32.to_le_bytes());
        out.extend([2, 0, heap_sizes, 1]);
        out.extend(valid.to_le_bytes());
        out.extend(0u64.to_le_bytes());
        for (_, _, rows) in &self.tables {
            out.extend(rows.to_le_bytes());
        }
        for (_, data, _) in &self.tables {
            out.extend(data);
        }
        pad4(&mut out);
        out
    }
}

fn pad4(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

fn metadata_root(table_stream: &str, tables: &[u8], heaps: &Heaps) -> Vec<u8> {
    let mut strings = heaps.strings.clone();
    pad4(&mut strings);
    let mut user_strings = heaps.user_strings.clone();
    pad4(&mut user_strings);
    let mut blobs = heaps.blobs.clone();
    pad4(&mut blobs);
    let guids: Vec<u8> = (1..=16).collect();

    let streams: [(&str, &[u8]); 5] = [
        (table_stream, tables),
        ("#Strings", &strings),
        ("#US", &user_strings),
        ("#GUID", &guids),
        ("#Blob", &blobs),
    ];

    let version = b"v4.0.30319\0\0";
    let mut header_size = 16 + version.len() + 4;
    for (name, _) in &streams {
        header_size += 8 + (name.len() + 1).div_ceil(4) * 4;
    }

    let mut root = Vec::new();
    root.extend(0x424A_5342u32.to_le_bytes());
    root.extend(1u16.to_le_bytes());
    root.extend(1u16.to_le_bytes());
    root.extend(0u32.to_le_bytes());
    root.extend((version.len() as u32).to_le_bytes());
    root.extend(version);
    root.extend(0u16.to_le_bytes());
    root.extend((streams.len() as u16).to_le_bytes());

    let mut offset = header_size;
    for (name, data) in &streams {
        root.extend((offset as u32).to_le_bytes());
        root.extend((data.len() as u32).to_le_bytes());
        root.extend(name.as_bytes());
        root.push(0);
        pad4(&mut root);
        offset += data.len();
    }
    for (_, data) in &streams {
        root.extend(*data);
    }
    root
}

fn pe_image(code: &[u8], metadata: &[u8], pe32_plus: bool) -> Vec<u8> {
    let mut section = vec![0u8; CLI_HEADER_SIZE];
    section.extend(code);
    pad4(&mut section);
    let metadata_rva = TEXT_RVA + section.len() as u32;
    section.extend(metadata);

    // CLI header
    section[0..4].copy_from_slice(&(CLI_HEADER_SIZE as u32).to_le_bytes());
    section[4..6].copy_from_slice(&2u16.to_le_bytes());
    section[6..8].copy_from_slice(&5u16.to_le_bytes());
    section[8..12].copy_from_slice(&metadata_rva.to_le_bytes());
    section[12..16].copy_from_slice(&(metadata.len() as u32).to_le_bytes());
    section[16..20].copy_from_slice(&1u32.to_le_bytes());

    let raw_size = section.len().div_ceil(0x200) * 0x200;
    let mut image = vec![0u8; TEXT_RAW_OFFSET + raw_size];

    // DOS header
    image[0..2].copy_from_slice(b"MZ");
    image[0x3C..0x40].copy_from_slice(&0x80u32.to_le_bytes());

    // PE32 and PE32+ differ in machine, magic and where the data directories start
    let (machine, characteristics, magic, optional_size, directories) = if pe32_plus {
        (0x8664u16, 0x2022u16, 0x020Bu16, 240usize, 112usize)
    } else {
        (0x014C, 0x2102, 0x010B, 224, 96)
    };

    // COFF header
    image[0x80..0x84].copy_from_slice(b"PE\0\0");
    image[0x84..0x86].copy_from_slice(&machine.to_le_bytes());
    image[0x86..0x88].copy_from_slice(&1u16.to_le_bytes());
    image[0x94..0x96].copy_from_slice(&(optional_size as u16).to_le_bytes());
    image[0x96..0x98].copy_from_slice(&characteristics.to_le_bytes());

    // Optional header; NumberOfRvaAndSizes sits just before the directories
    let optional = 0x98;
    image[optional..optional + 2].copy_from_slice(&magic.to_le_bytes());
    image[optional + directories - 4..optional + directories].copy_from_slice(&16u32.to_le_bytes());
    let cli_directory = optional + directories + 14 * 8;
    image[cli_directory..cli_directory + 4].copy_from_slice(&TEXT_RVA.to_le_bytes());
    image[cli_directory + 4..cli_directory + 8]
        .copy_from_slice(&(CLI_HEADER_SIZE as u32).to_le_bytes());

    // .text section header
    let header = optional + optional_size;
    image[header..header + 5].copy_from_slice(b".text");
    image[header + 8..header + 12].copy_from_slice(&(section.len() as u32).to_le_bytes());
    image[header + 12..header + 16].copy_from_slice(&TEXT_RVA.to_le_bytes());
    image[header + 16..header + 20].copy_from_slice(&(raw_size as u32).to_le_bytes());
    image[header + 20..header + 24].copy_from_slice(&(TEXT_RAW_OFFSET as u32).to_le_bytes());
    image[header + 36..header + 40].copy_from_slice(&0x6000_0020u32.to_le_bytes());

    image[TEXT_RAW_OFFSET..TEXT_RAW_OFFSET + section.len()].copy_from_slice(&section);
    image
}
