//! Session context.
//!
//! A [`Session`] ties together the persistence backend, the type catalog,
//! the in-memory tree and the active codec, and exposes the public operation
//! surface. One session serves exactly one logical caller: it is synchronous,
//! deliberately `!Send`, and protected by nothing. Callers that need to
//! share a session across threads must wrap it in their own mutual exclusion.
//!
//! The store populates itself lazily: the first operation after construction
//! triggers a full [`reload`](Session::init), which decodes every persisted
//! row, rebuilds the balanced index, and runs the registered initialization
//! routine (if any) with the privileged flag raised. While that flag is up,
//! `set` may mutate constants; the flag is guaranteed to drop on every exit
//! path of the routine, including errors and panics.

use std::cell::Cell;
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::codec::{Codec, FormatVersion};
use crate::coerce::{coerce_input, coerce_output};
use crate::error::{Error, Result};
use crate::persist::{VariableBackend, VariableRow};
use crate::store::{Entry, SearchOutcome, VariableStore};
use crate::types::{
    BuiltinCatalog, StoredContent, TypeCatalog, TypeId, TypedValue, WidthClass, CORE_NAMESPACE,
};

/// A routine run once after every reload, with constant mutation allowed.
pub type InitRoutine<B> = Rc<dyn Fn(&mut Session<B>) -> Result<()>>;

/// One logical caller's private variable store.
pub struct Session<B: VariableBackend> {
    backend: B,
    catalog: Rc<dyn TypeCatalog>,
    store: VariableStore,
    codec: Codec,
    virgin: bool,
    initialising: Rc<Cell<bool>>,
    init_routine: Option<InitRoutine<B>>,
}

impl<B: VariableBackend> Session<B> {
    /// Opens a session over `backend`, selecting the codec from the
    /// backend's persisted format marker. The store itself loads lazily on
    /// first use.
    pub fn new(backend: B, catalog: Rc<dyn TypeCatalog>) -> Result<Self> {
        let codec = Codec::for_version(backend.format_version()?);
        debug!(?codec, "session opened");
        Ok(Self {
            backend,
            catalog,
            store: VariableStore::new(),
            codec,
            virgin: true,
            initialising: Rc::new(Cell::new(false)),
            init_routine: None,
        })
    }

    /// Opens a session with the built-in type catalog.
    pub fn with_builtins(backend: B) -> Result<Self> {
        Self::new(backend, Rc::new(BuiltinCatalog::new()))
    }

    /// Creates a variable, optionally with an initial value coerced into the
    /// declared type. Returns `true` on success.
    pub fn create_variable(
        &mut self,
        name: &str,
        ty: TypeId,
        initial: Option<TypedValue>,
    ) -> Result<bool> {
        self.ensure_loaded()?;
        debug!(name, "create_variable");
        check_name(name)?;
        self.check_supported(ty)?;
        let width = self.catalog.width_of(ty)?;
        let content = match initial {
            None => None,
            Some(value) => Some(coerce_input(
                self.catalog.as_ref(),
                value.ty,
                &value.datum,
                ty,
            )?),
        };
        self.save_new(name, false, ty, width, content)
    }

    /// Creates a constant. Constants reject `set` outside the initialization
    /// routine; a null value is allowed.
    pub fn create_constant(
        &mut self,
        name: &str,
        ty: TypeId,
        value: Option<TypedValue>,
    ) -> Result<bool> {
        self.ensure_loaded()?;
        debug!(name, "create_constant");
        check_name(name)?;
        self.check_supported(ty)?;
        let width = self.catalog.width_of(ty)?;
        let content = match value {
            None => None,
            Some(value) => Some(coerce_input(
                self.catalog.as_ref(),
                value.ty,
                &value.datum,
                ty,
            )?),
        };
        self.save_new(name, true, ty, width, content)
    }

    /// Removes a variable or constant from the store and the backing table.
    pub fn drop_variable(&mut self, name: &str) -> Result<bool> {
        self.ensure_loaded()?;
        debug!(name, "drop");
        check_name(name)?;
        if !matches!(self.store.search(name), SearchOutcome::Found(_)) {
            return Err(Error::NotFound(name.to_string()));
        }
        // delete the row first, so a persistence failure leaves memory untouched
        self.backend.delete_row(name)?;
        self.store.remove(name)?;
        Ok(true)
    }

    /// Assigns a new value (or null) and returns the prior value, rendered in
    /// the incoming value's type (the variable's own type for a null
    /// assignment). Constants reject this unless the initialization routine
    /// is running.
    pub fn set(&mut self, name: &str, value: Option<TypedValue>) -> Result<Option<TypedValue>> {
        self.ensure_loaded()?;
        debug!(name, "set");
        check_name(name)?;
        let id = match self.store.search(name) {
            SearchOutcome::Found(id) => id,
            _ => return Err(Error::NotFound(name.to_string())),
        };
        let (entry_ty, is_const) = {
            let entry = self.store.entry(id);
            (entry.type_id(), entry.is_constant())
        };
        // the initialization routine is allowed to assign constants
        if is_const && !self.is_initialising() {
            return Err(Error::ConstantImmutable(name.to_string()));
        }

        let report_ty = value.as_ref().map(|v| v.ty).unwrap_or(entry_ty);
        let prior = match self.store.entry(id).content() {
            None => None,
            Some(stored) => Some(TypedValue::new(
                report_ty,
                coerce_output(self.catalog.as_ref(), entry_ty, stored, report_ty)?,
            )),
        };

        let new_content = match value {
            None => None,
            Some(value) => Some(coerce_input(
                self.catalog.as_ref(),
                value.ty,
                &value.datum,
                entry_ty,
            )?),
        };

        // persist before swapping memory; a write failure leaves both sides
        // at the prior state
        let bytes = self.encode_content(entry_ty, new_content.as_ref())?;
        self.backend.update_initial_value(name, bytes.as_deref())?;
        self.store.entry_mut(id).content = new_content;

        Ok(prior)
    }

    /// Alias of [`set`](Session::set), kept while callers migrate to the new
    /// name.
    pub fn alter_value(
        &mut self,
        name: &str,
        value: Option<TypedValue>,
    ) -> Result<Option<TypedValue>> {
        self.set(name, value)
    }

    /// Reads a value, coerced to `as_type`. A null value comes back as
    /// `None`, but only after verifying that a conversion path to `as_type`
    /// exists at all.
    pub fn get(&mut self, name: &str, as_type: TypeId) -> Result<Option<TypedValue>> {
        self.ensure_loaded()?;
        debug!(name, "get");
        let id = match self.store.search(name) {
            SearchOutcome::Found(id) => id,
            _ => return Err(Error::NotFound(name.to_string())),
        };
        let entry_ty = self.store.entry(id).type_id();
        match self.store.entry(id).content() {
            None => {
                self.verify_cast_path(entry_ty, as_type)?;
                Ok(None)
            }
            Some(stored) => {
                let datum = coerce_output(self.catalog.as_ref(), entry_ty, stored, as_type)?;
                Ok(Some(TypedValue::new(as_type, datum)))
            }
        }
    }

    /// Declared storage type of a variable or constant.
    pub fn type_of(&mut self, name: &str) -> Result<TypeId> {
        self.ensure_loaded()?;
        debug!(name, "type_of");
        match self.store.search(name) {
            SearchOutcome::Found(id) => Ok(self.store.entry(id).type_id()),
            _ => Err(Error::NotFound(name.to_string())),
        }
    }

    pub fn exists(&mut self, name: &str) -> Result<bool> {
        self.ensure_loaded()?;
        debug!(name, "exists");
        Ok(matches!(self.store.search(name), SearchOutcome::Found(_)))
    }

    pub fn is_constant(&mut self, name: &str) -> Result<bool> {
        self.ensure_loaded()?;
        debug!(name, "is_constant");
        match self.store.search(name) {
            SearchOutcome::Found(id) => Ok(self.store.entry(id).is_constant()),
            _ => Err(Error::NotFound(name.to_string())),
        }
    }

    /// Discards the in-memory state and reloads everything from the backing
    /// table. Returns the number of entries loaded.
    pub fn init(&mut self) -> Result<usize> {
        debug!("init");
        self.reload()
    }

    /// Re-serializes every loaded entry from the legacy V1 layout to V2 and
    /// flips the persisted format marker. Running it again once the store is
    /// already on V2 is a no-op.
    pub fn upgrade_format(&mut self) -> Result<()> {
        self.ensure_loaded()?;
        if self.codec == Codec::V2 && self.backend.format_version()? == FormatVersion::V2 {
            debug!("storage format already current, nothing to upgrade");
            return Ok(());
        }
        info!("upgrading session variables from storage format V1 to V2");
        self.codec = Codec::V2;

        let updates = self
            .store
            .iter()
            .map(|entry| {
                let bytes = self.encode_content(entry.type_id(), entry.content())?;
                Ok((entry.name().to_string(), bytes))
            })
            .collect::<Result<Vec<_>>>()?;
        for (name, bytes) in updates {
            self.backend.update_initial_value(&name, bytes.as_deref())?;
        }
        self.backend.set_format_version(FormatVersion::V2)
    }

    /// Whether the initialization routine is currently executing.
    pub fn is_initialising(&self) -> bool {
        self.initialising.get()
    }

    /// Registers the routine run once after every reload. While it runs,
    /// [`is_initialising`](Session::is_initialising) reports `true` and
    /// constants may be assigned.
    pub fn register_initialisation<F>(&mut self, routine: F)
    where
        F: Fn(&mut Session<B>) -> Result<()> + 'static,
    {
        self.init_routine = Some(Rc::new(routine));
    }

    /// All names in the store, ascending.
    pub fn variable_names(&mut self) -> Result<Vec<String>> {
        self.ensure_loaded()?;
        Ok(self.store.iter().map(|e| e.name().to_string()).collect())
    }

    /// Resolves a `namespace.name` (or bare, core-namespace) type spec.
    pub fn resolve_type(&self, spec: &str) -> Result<TypeId> {
        if spec.is_empty() {
            return Err(Error::NullValueNotAllowed("variable type"));
        }
        let (namespace, name) = spec.split_once('.').unwrap_or((CORE_NAMESPACE, spec));
        self.catalog
            .lookup(namespace, name)
            .ok_or_else(|| Error::UnsupportedType(spec.to_string()))
    }

    pub fn catalog(&self) -> &dyn TypeCatalog {
        self.catalog.as_ref()
    }

    /// The in-memory index. Loaded lazily, so it is empty until the first
    /// operation runs.
    pub fn store(&self) -> &VariableStore {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Direct backend access, bypassing the store. Intended for tests and
    /// maintenance tooling; mutating rows through this handle leaves the
    /// in-memory tree stale until the next `init`.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn active_codec(&self) -> Codec {
        self.codec
    }

    // ---- internals ----

    fn ensure_loaded(&mut self) -> Result<()> {
        if self.virgin {
            self.reload()?;
        }
        Ok(())
    }

    fn reload(&mut self) -> Result<usize> {
        debug!("reloading session variables");
        self.store.clear();
        self.virgin = false;

        let rows = self.backend.select_all_ordered_by_name()?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(ty) = self.catalog.lookup(&row.type_namespace, &row.type_name) else {
                warn!(
                    "skipping variable \"{}\": unknown type {}.{}",
                    row.name, row.type_namespace, row.type_name
                );
                continue;
            };
            if self.catalog.is_pseudo(ty) {
                warn!(
                    "skipping variable \"{}\": pseudo type {}.{}",
                    row.name, row.type_namespace, row.type_name
                );
                continue;
            }
            let width = self.catalog.width_of(ty)?;
            let content = match &row.initial_value {
                None => None,
                Some(raw) => {
                    match self.codec.decode(self.catalog.as_ref(), &row.name, ty, raw) {
                        Ok(datum) => {
                            Some(coerce_input(self.catalog.as_ref(), ty, &datum, ty)?)
                        }
                        Err(Error::CorruptRow(_)) => {
                            // reported loudly by the codec; the row is not trusted
                            warn!(
                                "variable \"{}\" is incorrectly stored in the variables table",
                                row.name
                            );
                            continue;
                        }
                        Err(other) => return Err(other),
                    }
                }
            };
            entries.push(Entry::new(&row.name, ty, width, row.is_constant, content));
        }
        self.store.rebuild_from_sorted(entries);
        let count = self.store.len();

        self.invoke_initialisation()?;

        debug!(count, "reload complete");
        Ok(count)
    }

    fn invoke_initialisation(&mut self) -> Result<()> {
        let Some(routine) = self.init_routine.clone() else {
            return Ok(());
        };
        debug!("running the variable initialisation routine");
        let _guard = InitGuard::engage(&self.initialising);
        routine(self)
    }

    fn save_new(
        &mut self,
        name: &str,
        is_constant: bool,
        ty: TypeId,
        width: WidthClass,
        content: Option<StoredContent>,
    ) -> Result<bool> {
        let initial_value = self.encode_content(ty, content.as_ref())?;
        let (type_namespace, type_name) = self
            .catalog
            .name_of(ty)
            .map(|(ns, n)| (ns.to_string(), n.to_string()))
            .ok_or_else(|| Error::Internal(format!("unknown {ty}")))?;
        let row = VariableRow {
            name: name.to_string(),
            is_constant,
            type_namespace,
            type_name,
            initial_value,
        };

        self.store
            .insert(Entry::new(name, ty, width, is_constant, content))?;
        if let Err(err) = self.backend.insert_row(&row) {
            // roll the in-memory insert back so tree and table stay consistent
            let _ = self.store.remove(name);
            return Err(err);
        }
        Ok(true)
    }

    fn encode_content(
        &self,
        ty: TypeId,
        content: Option<&StoredContent>,
    ) -> Result<Option<Vec<u8>>> {
        content
            .map(|c| self.codec.encode(self.catalog.as_ref(), ty, c))
            .transpose()
    }

    fn check_supported(&self, ty: TypeId) -> Result<()> {
        if self.catalog.is_pseudo(ty) {
            return Err(Error::UnsupportedType(self.catalog.display_name(ty)));
        }
        Ok(())
    }

    /// A conversion path exists when the types match, a direct function is
    /// registered, or both ends have text primitives for the round trip.
    fn verify_cast_path(&self, from: TypeId, to: TypeId) -> Result<()> {
        if from == to || self.catalog.direct_conversion(from, to).is_some() {
            return Ok(());
        }
        if self.catalog.text_io(from).is_ok() && self.catalog.text_io(to).is_ok() {
            return Ok(());
        }
        Err(Error::CoercionFailed {
            from: self.catalog.display_name(from),
            to: self.catalog.display_name(to),
        })
    }
}

/// Raises the privileged-initialization flag for the guard's lifetime.
/// Dropping the guard lowers it again on every exit path, errors and panics
/// included.
struct InitGuard {
    flag: Rc<Cell<bool>>,
}

impl InitGuard {
    fn engage(flag: &Rc<Cell<bool>>) -> Self {
        flag.set(true);
        Self { flag: Rc::clone(flag) }
    }
}

impl Drop for InitGuard {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::EmptyName);
    }
    Ok(())
}
