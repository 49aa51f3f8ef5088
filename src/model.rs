use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

pub(crate) const ACC_STATIC: u16 = 0x0008;

/// One class of an archive, with members referenced by full signature.
#[derive(Clone, Debug)]
pub(crate) struct ClassRecord {
    pub(crate) name: String,
    pub(crate) super_name: Option<String>,
    pub(crate) interfaces: Vec<String>,
    pub(crate) access: u16,
    pub(crate) methods: Vec<String>,
    pub(crate) fields: Vec<String>,
    pub(crate) obfuscated: bool,
}

impl ClassRecord {
    pub(crate) fn in_default_package(&self) -> bool {
        crate::names::in_default_package(&self.name)
    }
}

/// A method together with the lossy projection of its body.
#[derive(Clone, Debug)]
pub(crate) struct MethodRecord {
    pub(crate) name: String,
    pub(crate) owner: String,
    pub(crate) descriptor: String,
    pub(crate) access: u16,
    pub(crate) exceptions: Vec<String>,
    pub(crate) code: Vec<Insn>,
    pub(crate) constants: Vec<ConstValue>,
    pub(crate) obfuscated: bool,
}

impl MethodRecord {
    pub(crate) fn is_static(&self) -> bool {
        self.access & ACC_STATIC != 0
    }

    pub(crate) fn is_special_name(&self) -> bool {
        self.name.starts_with('<')
    }

    pub(crate) fn full_signature(&self) -> String {
        format!("{}.{}{}", self.owner, self.name, self.descriptor)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct FieldRecord {
    pub(crate) name: String,
    pub(crate) owner: String,
    pub(crate) descriptor: String,
    pub(crate) access: u16,
    pub(crate) value: Option<ConstValue>,
    pub(crate) obfuscated: bool,
}

impl FieldRecord {
    pub(crate) fn is_static(&self) -> bool {
        self.access & ACC_STATIC != 0
    }

    pub(crate) fn full_signature(&self) -> String {
        format!("{}.{}:{}", self.owner, self.name, self.descriptor)
    }
}

/// Projected instruction: the categorical opcode plus the reference it
/// carries, if any. Operand bytes, local indices, and line info are dropped
/// at parse time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Insn {
    pub(crate) opcode: u8,
    pub(crate) kind: InsnKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum InsnKind {
    Plain,
    Field { owner: String, name: String },
    Call { owner: String, name: String, descriptor: String },
    Type(String),
}

/// Literal constant loaded by an `ldc`-family instruction, or a field's
/// initial value. Float variants compare and hash by bit pattern so the
/// value can key maps.
#[derive(Clone, Debug)]
pub(crate) enum ConstValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Type(String),
}

impl ConstValue {
    fn rank(&self) -> u8 {
        match self {
            ConstValue::Int(_) => 0,
            ConstValue::Long(_) => 1,
            ConstValue::Float(_) => 2,
            ConstValue::Double(_) => 3,
            ConstValue::Str(_) => 4,
            ConstValue::Type(_) => 5,
        }
    }
}

impl PartialEq for ConstValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConstValue::Int(a), ConstValue::Int(b)) => a == b,
            (ConstValue::Long(a), ConstValue::Long(b)) => a == b,
            (ConstValue::Float(a), ConstValue::Float(b)) => a.to_bits() == b.to_bits(),
            (ConstValue::Double(a), ConstValue::Double(b)) => a.to_bits() == b.to_bits(),
            (ConstValue::Str(a), ConstValue::Str(b)) => a == b,
            (ConstValue::Type(a), ConstValue::Type(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ConstValue {}

impl Hash for ConstValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u8(self.rank());
        match self {
            ConstValue::Int(v) => v.hash(state),
            ConstValue::Long(v) => v.hash(state),
            ConstValue::Float(v) => v.to_bits().hash(state),
            ConstValue::Double(v) => v.to_bits().hash(state),
            ConstValue::Str(v) => v.hash(state),
            ConstValue::Type(v) => v.hash(state),
        }
    }
}

impl Ord for ConstValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self, other) {
            (ConstValue::Int(a), ConstValue::Int(b)) => a.cmp(b),
            (ConstValue::Long(a), ConstValue::Long(b)) => a.cmp(b),
            (ConstValue::Float(a), ConstValue::Float(b)) => a.to_bits().cmp(&b.to_bits()),
            (ConstValue::Double(a), ConstValue::Double(b)) => a.to_bits().cmp(&b.to_bits()),
            (ConstValue::Str(a), ConstValue::Str(b)) => a.cmp(b),
            (ConstValue::Type(a), ConstValue::Type(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for ConstValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// All symbols of one archive, keyed by full signature. Built once by the
/// loader and read-only afterwards.
#[derive(Debug, Default)]
pub(crate) struct Environment {
    classes: BTreeMap<String, ClassRecord>,
    methods: BTreeMap<String, MethodRecord>,
    fields: BTreeMap<String, FieldRecord>,
}

impl Environment {
    pub(crate) fn insert_class(&mut self, record: ClassRecord) {
        self.classes.insert(record.name.clone(), record);
    }

    pub(crate) fn insert_method(&mut self, record: MethodRecord) {
        self.methods.insert(record.full_signature(), record);
    }

    pub(crate) fn insert_field(&mut self, record: FieldRecord) {
        self.fields.insert(record.full_signature(), record);
    }

    pub(crate) fn class(&self, binary_name: &str) -> Option<&ClassRecord> {
        self.classes.get(binary_name)
    }

    pub(crate) fn method(&self, full_signature: &str) -> Option<&MethodRecord> {
        self.methods.get(full_signature)
    }

    pub(crate) fn field(&self, full_signature: &str) -> Option<&FieldRecord> {
        self.fields.get(full_signature)
    }

    pub(crate) fn classes(&self) -> impl Iterator<Item = (&String, &ClassRecord)> {
        self.classes.iter()
    }

    pub(crate) fn methods(&self) -> impl Iterator<Item = (&String, &MethodRecord)> {
        self.methods.iter()
    }

    pub(crate) fn fields(&self) -> impl Iterator<Item = (&String, &FieldRecord)> {
        self.fields.iter()
    }

    pub(crate) fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub(crate) fn method_count(&self) -> usize {
        self.methods.len()
    }

    pub(crate) fn field_count(&self) -> usize {
        self.fields.len()
    }
}

/// Owner class of a method or field full signature.
pub(crate) fn member_key_owner(full_signature: &str) -> &str {
    match full_signature.find('.') {
        Some(index) => &full_signature[..index],
        None => full_signature,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub(crate) fn plain_code(opcodes: &[u8]) -> Vec<Insn> {
        opcodes
            .iter()
            .map(|opcode| Insn {
                opcode: *opcode,
                kind: InsnKind::Plain,
            })
            .collect()
    }

    pub(crate) fn method(owner: &str, name: &str, descriptor: &str, obfuscated: bool) -> MethodRecord {
        MethodRecord {
            name: name.to_string(),
            owner: owner.to_string(),
            descriptor: descriptor.to_string(),
            access: 0,
            exceptions: Vec::new(),
            code: Vec::new(),
            constants: Vec::new(),
            obfuscated,
        }
    }

    pub(crate) fn static_method(
        owner: &str,
        name: &str,
        descriptor: &str,
        obfuscated: bool,
    ) -> MethodRecord {
        let mut record = method(owner, name, descriptor, obfuscated);
        record.access = ACC_STATIC;
        record
    }

    pub(crate) fn field(owner: &str, name: &str, descriptor: &str, obfuscated: bool) -> FieldRecord {
        FieldRecord {
            name: name.to_string(),
            owner: owner.to_string(),
            descriptor: descriptor.to_string(),
            access: 0,
            value: None,
            obfuscated,
        }
    }

    pub(crate) fn class(name: &str, obfuscated: bool) -> ClassRecord {
        ClassRecord {
            name: name.to_string(),
            super_name: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            access: 0,
            methods: Vec::new(),
            fields: Vec::new(),
            obfuscated,
        }
    }

    /// Insert a class and its members, wiring up the ownership key lists.
    pub(crate) fn install(
        env: &mut Environment,
        mut class: ClassRecord,
        methods: Vec<MethodRecord>,
        fields: Vec<FieldRecord>,
    ) {
        for method in methods {
            class.methods.push(method.full_signature());
            env.insert_method(method);
        }
        for field in fields {
            class.fields.push(field.full_signature());
            env.insert_field(field);
        }
        env.insert_class(class);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_signatures_follow_the_canonical_key_format() {
        let method = fixtures::method("com/example/A", "run", "(I)V", false);
        assert_eq!(method.full_signature(), "com/example/A.run(I)V");

        let field = fixtures::field("com/example/A", "count", "I", false);
        assert_eq!(field.full_signature(), "com/example/A.count:I");
    }

    #[test]
    fn member_key_owner_splits_at_the_first_dot() {
        assert_eq!(member_key_owner("com/example/A.run(I)V"), "com/example/A");
        assert_eq!(member_key_owner("a.b:I"), "a");
    }

    #[test]
    fn float_constants_compare_by_bit_pattern() {
        assert_eq!(ConstValue::Float(1.5), ConstValue::Float(1.5));
        assert_ne!(ConstValue::Float(1.5), ConstValue::Float(2.5));
        assert_ne!(ConstValue::Float(1.0), ConstValue::Double(1.0));
        assert_eq!(ConstValue::Double(f64::NAN), ConstValue::Double(f64::NAN));
    }

    #[test]
    fn static_flag_is_derived_from_access_bits() {
        let method = fixtures::static_method("A", "m", "()V", true);
        assert!(method.is_static());
        assert!(!fixtures::method("A", "m", "()V", true).is_static());
    }

    #[test]
    fn environment_lookups_use_full_signatures() {
        let mut env = Environment::default();
        fixtures::install(
            &mut env,
            fixtures::class("A", true),
            vec![fixtures::method("A", "m", "()V", true)],
            vec![fixtures::field("A", "f", "I", true)],
        );

        assert!(env.class("A").is_some());
        assert!(env.method("A.m()V").is_some());
        assert!(env.field("A.f:I").is_some());
        assert_eq!(env.class("A").unwrap().methods, vec!["A.m()V".to_string()]);
    }
}
