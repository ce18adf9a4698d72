use std::fmt;

use clap::{Parser, Subcommand};
use p11_base_hsm::{
    AesKeySize, AesKeySpec, EcCurve, EcKeyPairSpec, ObjectFilter, RsaKeyPairSpec, RsaKeySize,
    Session, Template,
    reexport::cosmian_pkcs11_sys::{
        CK_ATTRIBUTE_TYPE, CK_OBJECT_HANDLE, CK_ULONG, CKA_CLASS, CKA_DECRYPT, CKA_ENCRYPT,
        CKA_EXTRACTABLE, CKA_KEY_TYPE, CKA_LABEL, CKA_MODIFIABLE, CKA_PRIVATE, CKA_SENSITIVE,
        CKA_TOKEN, CKA_UNWRAP, CKA_WRAP, CKK_AES, CKK_DES3, CKK_EC, CKK_RSA, CKO_CERTIFICATE,
        CKO_DATA, CKO_PRIVATE_KEY, CKO_PUBLIC_KEY, CKO_SECRET_KEY,
    },
};
use serde::Serialize;
use tracing::debug;

use crate::{
    actions::{P11Context, console::Stdout},
    cli_bail,
    error::{CliError, result::CliResult},
};

/// Boolean attributes shown for a key
const SHOWN_ATTRIBUTES: [(&str, CK_ATTRIBUTE_TYPE); 9] = [
    ("CKA_TOKEN", CKA_TOKEN),
    ("CKA_PRIVATE", CKA_PRIVATE),
    ("CKA_ENCRYPT", CKA_ENCRYPT),
    ("CKA_DECRYPT", CKA_DECRYPT),
    ("CKA_WRAP", CKA_WRAP),
    ("CKA_UNWRAP", CKA_UNWRAP),
    ("CKA_EXTRACTABLE", CKA_EXTRACTABLE),
    ("CKA_MODIFIABLE", CKA_MODIFIABLE),
    ("CKA_SENSITIVE", CKA_SENSITIVE),
];

/// Create, find, inspect and destroy objects
#[derive(Subcommand)]
pub enum ObjectsCommands {
    Copy(CopyAction),
    GetAttributes(GetAttributesAction),
    SetLabel(SetLabelAction),
    GenerateAes(GenerateAesAction),
    GenerateRsa(GenerateRsaAction),
    GenerateEc(GenerateEcAction),
    GenerateDes3(GenerateDes3Action),
    Find(FindAction),
    List(ListObjectsAction),
    Destroy(DestroyAction),
}

impl ObjectsCommands {
    /// # Errors
    /// Fails if the command fails.
    pub fn process(&self, ctx: &P11Context) -> CliResult<()> {
        match self {
            Self::Copy(action) => action.run(ctx),
            Self::GetAttributes(action) => action.run(ctx),
            Self::SetLabel(action) => action.run(ctx),
            Self::GenerateAes(action) => action.run(ctx),
            Self::GenerateRsa(action) => action.run(ctx),
            Self::GenerateEc(action) => action.run(ctx),
            Self::GenerateDes3(action) => action.run(ctx),
            Self::Find(action) => action.run(ctx),
            Self::List(action) => action.run(ctx),
            Self::Destroy(action) => action.run(ctx),
        }
    }
}

fn yes_no(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "YES",
        Some(false) => "NO",
        None => "N/A",
    }
}

fn add_key_attributes(
    session: &Session,
    handle: CK_OBJECT_HANDLE,
    stdout: &mut Stdout,
) -> CliResult<()> {
    let types: Vec<CK_ATTRIBUTE_TYPE> = SHOWN_ATTRIBUTES.iter().map(|(_, t)| *t).collect();
    let values = session
        .get_attributes(handle, &types)?
        .ok_or_else(|| CliError::UserError(format!("no object with handle {handle}")))?;
    for (name, attribute) in SHOWN_ATTRIBUTES {
        stdout.add_value(name, yes_no(values.get_bool(attribute)));
    }
    Ok(())
}

fn find_by_label(session: &Session, label: &str) -> CliResult<CK_OBJECT_HANDLE> {
    session
        .find_object(label)?
        .ok_or_else(|| CliError::UserError(format!("no object labelled '{label}'")))
}

/// Generate an AES-256 session key, copy it with `C_CopyObject` into a
/// narrower key and show the attributes of both
#[derive(Parser, Debug, Default)]
pub struct CopyAction {}

impl CopyAction {
    /// # Errors
    /// Fails if the source key cannot be generated or copied.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let session = ctx.session()?;
        let source = session.generate_aes_key(&AesKeySpec {
            extractable: true,
            wrap: true,
            unwrap: true,
            ..AesKeySpec::new(AesKeySize::Aes256)
        })?;
        let copy = session.copy_object(
            source,
            &Template::new()
                .token(false)
                .encrypt(true)
                .decrypt(false)
                .wrap(true)
                .unwrap(false)
                .sensitive(true)
                .extractable(false)
                .modifiable(false),
        )?;
        debug!("Key {source} copied to {copy}");

        let mut source_out = Stdout::new("Source key");
        source_out.set_handle(source);
        add_key_attributes(&session, source, &mut source_out)?;
        ctx.write(&source_out)?;

        let mut copy_out = Stdout::new("Copied key");
        copy_out.set_handle(copy);
        add_key_attributes(&session, copy, &mut copy_out)?;
        ctx.write(&copy_out)
    }
}

/// Show the attributes of the key with this label
#[derive(Parser, Debug, Default)]
pub struct GetAttributesAction {
    #[clap(long, short = 'l')]
    pub label: String,
}

impl GetAttributesAction {
    /// # Errors
    /// Fails if no object has this label.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let session = ctx.session()?;
        let handle = find_by_label(&session, &self.label)?;
        let mut stdout = Stdout::new(&format!("Attributes of '{}'", self.label));
        stdout.set_handle(handle);
        stdout.add_value("CKA_LABEL", session.get_label(handle)?.unwrap_or_default());
        add_key_attributes(&session, handle, &mut stdout)?;
        ctx.write(&stdout)
    }
}

/// Change the label of an object
#[derive(Parser, Debug, Default)]
pub struct SetLabelAction {
    #[clap(long, short = 'l')]
    pub label: String,

    #[clap(long, short = 'n')]
    pub new_label: String,
}

impl SetLabelAction {
    /// # Errors
    /// Fails if no object has this label or the object is not modifiable.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let session = ctx.session()?;
        let handle = find_by_label(&session, &self.label)?;
        session.set_label(handle, &self.new_label)?;
        let label = session.get_label(handle)?.unwrap_or_default();
        let mut stdout = Stdout::new("Label changed.");
        stdout.set_handle(handle);
        stdout.add_value("Label", label);
        ctx.write(&stdout)
    }
}

#[derive(Parser, Debug, Default)]
pub struct GenerateAesAction {
    #[clap(long, short = 'l')]
    pub label: Option<String>,

    /// Key size in bits: 128, 192 or 256
    #[clap(long, short = 's', default_value = "256")]
    pub size: usize,

    /// Store the key on the token
    #[clap(long, default_value = "false")]
    pub token: bool,
}

impl GenerateAesAction {
    /// # Errors
    /// Fails if the size is invalid or the token refuses the key.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let size = AesKeySize::from_bits(self.size)?;
        let key = ctx.session()?.generate_aes_key(&AesKeySpec {
            label: self.label.clone(),
            token: self.token,
            ..AesKeySpec::new(size)
        })?;
        let mut stdout = Stdout::new(&format!("AES-{} key generated.", self.size));
        stdout.set_handle(key);
        ctx.write(&stdout)
    }
}

#[derive(Parser, Debug, Default)]
pub struct GenerateRsaAction {
    #[clap(long, short = 'l')]
    pub label: Option<String>,

    /// Modulus size in bits: 1024, 2048, 3072 or 4096
    #[clap(long, short = 's', default_value = "2048")]
    pub size: usize,

    #[clap(long, default_value = "false")]
    pub token: bool,

    /// Generate the primes with the Luna FIPS 186-3 mechanism
    #[clap(long, default_value = "false")]
    pub fips_186_3: bool,
}

impl GenerateRsaAction {
    /// # Errors
    /// Fails if the size is invalid or the token refuses the key pair.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let size = RsaKeySize::from_bits(self.size)?;
        let (public_key, private_key) = ctx.session()?.generate_rsa_key_pair(&RsaKeyPairSpec {
            label: self.label.clone(),
            size,
            token: self.token,
            fips_186_3: self.fips_186_3,
            ..RsaKeyPairSpec::default()
        })?;
        let mut stdout = Stdout::new(&format!("RSA-{} key pair generated.", self.size));
        stdout.set_key_pair_handles(public_key, private_key);
        ctx.write(&stdout)
    }
}

#[derive(Parser, Debug, Default)]
pub struct GenerateEcAction {
    #[clap(long, short = 'l')]
    pub label: Option<String>,

    /// Named curve: p256, p384, p521 or secp256k1
    #[clap(long, short = 'c', default_value = "p384")]
    pub curve: EcCurve,

    #[clap(long, default_value = "false")]
    pub token: bool,

    /// Allow the private key to derive (ECDH) instead of signing
    #[clap(long, default_value = "false")]
    pub derive: bool,
}

impl GenerateEcAction {
    /// # Errors
    /// Fails if the token refuses the key pair.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let (public_key, private_key) = ctx.session()?.generate_ec_key_pair(&EcKeyPairSpec {
            label: self.label.clone(),
            curve: self.curve,
            token: self.token,
            sign_verify: !self.derive,
            derive: self.derive,
        })?;
        let mut stdout = Stdout::new(&format!("{} key pair generated.", self.curve));
        stdout.set_key_pair_handles(public_key, private_key);
        ctx.write(&stdout)
    }
}

#[derive(Parser, Debug, Default)]
pub struct GenerateDes3Action {
    #[clap(long, short = 'l')]
    pub label: Option<String>,

    #[clap(long, default_value = "false")]
    pub token: bool,

    /// Allow the key to wrap and unwrap other keys
    #[clap(long, default_value = "false")]
    pub wrap: bool,
}

impl GenerateDes3Action {
    /// # Errors
    /// Fails if the token refuses the key.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let key = ctx
            .session()?
            .generate_des3_key(self.label.as_deref(), self.token, self.wrap)?;
        let mut stdout = Stdout::new("DES3 key generated.");
        stdout.set_handle(key);
        ctx.write(&stdout)
    }
}

/// Find the handle of the object with this label
#[derive(Parser, Debug, Default)]
pub struct FindAction {
    #[clap(long, short = 'l')]
    pub label: String,
}

impl FindAction {
    /// # Errors
    /// Fails if no object has this label.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let handle = find_by_label(&ctx.session()?, &self.label)?;
        let mut stdout = Stdout::new(&format!("Object '{}' found.", self.label));
        stdout.set_handle(handle);
        ctx.write(&stdout)
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ObjectClass {
    #[default]
    Any,
    SecretKey,
    PrivateKey,
    PublicKey,
}

impl From<ObjectClass> for ObjectFilter {
    fn from(class: ObjectClass) -> Self {
        match class {
            ObjectClass::Any => Self::Any,
            ObjectClass::SecretKey => Self::SecretKey,
            ObjectClass::PrivateKey => Self::PrivateKey,
            ObjectClass::PublicKey => Self::PublicKey,
        }
    }
}

/// An object found on the token or in the session
#[derive(Debug, Serialize, PartialEq, Eq)]
struct ObjectEntry {
    handle: CK_OBJECT_HANDLE,
    class: &'static str,
    key_type: &'static str,
    label: String,
}

impl fmt::Display for ObjectEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>6} | {:<12} | {:<5} | {}",
            self.handle, self.class, self.key_type, self.label
        )
    }
}

const fn class_name(class: Option<CK_ULONG>) -> &'static str {
    match class {
        Some(CKO_DATA) => "data",
        Some(CKO_CERTIFICATE) => "certificate",
        Some(CKO_PUBLIC_KEY) => "public key",
        Some(CKO_PRIVATE_KEY) => "private key",
        Some(CKO_SECRET_KEY) => "secret key",
        _ => "other",
    }
}

const fn key_type_name(key_type: Option<CK_ULONG>) -> &'static str {
    match key_type {
        Some(CKK_AES) => "AES",
        Some(CKK_DES3) => "DES3",
        Some(CKK_RSA) => "RSA",
        Some(CKK_EC) => "EC",
        Some(_) => "other",
        None => "-",
    }
}

/// List the objects visible to the session
#[derive(Parser, Debug, Default)]
pub struct ListObjectsAction {
    #[clap(long, short = 'c', value_enum, default_value_t = ObjectClass::Any)]
    pub class: ObjectClass,
}

impl ListObjectsAction {
    /// # Errors
    /// Fails if the search fails.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let session = ctx.session()?;
        let handles = session.list_objects(self.class.into())?;
        let mut entries = Vec::with_capacity(handles.len());
        for handle in handles {
            let Some(values) = session.get_attributes(handle, &[CKA_CLASS, CKA_KEY_TYPE, CKA_LABEL])?
            else {
                continue;
            };
            entries.push(ObjectEntry {
                handle,
                class: class_name(values.get_ulong(CKA_CLASS)),
                key_type: key_type_name(values.get_ulong(CKA_KEY_TYPE)),
                label: values.get_string(CKA_LABEL).unwrap_or_default(),
            });
        }
        let mut stdout = Stdout::new(&format!("{} object(s) found.", entries.len()));
        stdout.set_items(&entries)?;
        ctx.write(&stdout)
    }
}

/// Destroy the object with this label
#[derive(Parser, Debug, Default)]
pub struct DestroyAction {
    #[clap(long, short = 'l', required_unless_present = "handle")]
    pub label: Option<String>,

    /// Handle of the object, instead of its label
    #[clap(long, conflicts_with = "label")]
    pub handle: Option<CK_OBJECT_HANDLE>,
}

impl DestroyAction {
    /// # Errors
    /// Fails if no object matches or the object cannot be destroyed.
    pub fn run(&self, ctx: &P11Context) -> CliResult<()> {
        let session = ctx.session()?;
        let handle = match (&self.label, self.handle) {
            (_, Some(handle)) => handle,
            (Some(label), None) => find_by_label(&session, label)?,
            (None, None) => cli_bail!("either --label or --handle is required"),
        };
        session.destroy_object(handle)?;
        let mut stdout = Stdout::new("Object destroyed.");
        stdout.set_handle(handle);
        ctx.write(&stdout)
    }
}

#[cfg(test)]
mod tests {
    use p11_base_hsm::reexport::cosmian_pkcs11_sys::{CKK_AES, CKO_SECRET_KEY};

    use super::{ObjectEntry, class_name, key_type_name, yes_no};

    #[test]
    fn object_entry_display() {
        let entry = ObjectEntry {
            handle: 42,
            class: class_name(Some(CKO_SECRET_KEY)),
            key_type: key_type_name(Some(CKK_AES)),
            label: "MasterKey".to_owned(),
        };
        assert_eq!(entry.to_string(), "    42 | secret key   | AES   | MasterKey");
        assert_eq!(key_type_name(None), "-");
    }

    #[test]
    fn boolean_attributes() {
        assert_eq!(yes_no(Some(true)), "YES");
        assert_eq!(yes_no(Some(false)), "NO");
        assert_eq!(yes_no(None), "N/A");
    }
}
