//! The library manager: a directory-backed store of analyzed top-level
//! units, their name index, and mtime-ordered architecture selection.

use crate::ident::Ident;
use crate::tree::{self, Kind, Tree};
use std::cell::RefCell;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{SystemTime, SystemTimeError, UNIX_EPOCH};
use std::{error, fmt};

/// Microseconds since the Unix epoch, matching `lib_mtime_t`'s
/// sub-second precision (`lib_time_to_usecs`).
pub type Mtime = i64;

const MARKER_FILE: &str = "_NVC_LIB";
const INDEX_FILE: &str = "_index";
const PACKAGE_VERSION: &str = "vhdl-elab 0.1.0";

#[derive(Debug)]
pub enum Error {
    AlreadyExists(PathBuf),
    Io(io::Error),
    Time(SystemTimeError),
    Serialize(tree::serialize::Error),
    CorruptIndex,
    NoSuchUnit(Ident),
    NoSuchArch(Ident),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyExists(p) => write!(f, "file {} already exists", p.display()),
            Self::Io(e) => write!(f, "{e}"),
            Self::Time(e) => write!(f, "{e}"),
            Self::Serialize(e) => write!(f, "corrupt library unit: {e}"),
            Self::CorruptIndex => write!(f, "corrupt library index"),
            Self::NoSuchUnit(id) => write!(f, "unit {id} not found"),
            Self::NoSuchArch(id) => write!(f, "no architecture of {id} found"),
        }
    }
}

impl error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<SystemTimeError> for Error {
    fn from(e: SystemTimeError) -> Self {
        Error::Time(e)
    }
}

impl From<tree::serialize::Error> for Error {
    fn from(e: tree::serialize::Error) -> Self {
        Error::Serialize(e)
    }
}

struct UnitEntry {
    top: Tree,
    kind: Kind,
    dirty: bool,
    mtime: Mtime,
}

struct Inner {
    /// Empty for [`Library::tmp`] — a unit-test fixture library that
    /// never touches the filesystem.
    path: PathBuf,
    name: Ident,
    units: Vec<UnitEntry>,
    index: Vec<(Ident, Kind)>,
}

/// A handle to an open library. Cheap to clone; clones share the same
/// in-memory unit cache and index.
#[derive(Clone)]
pub struct Library(Rc<RefCell<Inner>>);

thread_local! {
    static LOADED: RefCell<Vec<Library>> = const { RefCell::new(Vec::new()) };
    static WORK: RefCell<Option<Library>> = const { RefCell::new(None) };
}

fn upcase_name(name: &str) -> Ident {
    let base = name.rsplit('/').next().unwrap_or(name);
    Ident::new(&base.to_ascii_uppercase())
}

fn now_usecs() -> Mtime {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as Mtime)
        .unwrap_or(0)
}

fn mtime_of(path: &Path) -> Result<Mtime, Error> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(modified.duration_since(UNIX_EPOCH)?.as_micros() as Mtime)
}

/// Where an installed copy of the core would look for bundled libraries.
/// This crate ships no such install tree; the constant exists so
/// `find(.., search: true)` has a final, deterministic place to look
/// instead of silently skipping it.
fn install_libdir() -> PathBuf {
    PathBuf::from("/usr/local/lib/vhdl-elab")
}

impl Library {
    /// Create a brand new library directory on disk (`lib_new`). Fails
    /// if `name` already exists as a file or directory.
    pub fn new(name: &str) -> Result<Library, Error> {
        let path = Path::new(name);
        if path.exists() {
            return Err(Error::AlreadyExists(path.to_path_buf()));
        }
        fs::create_dir(path)?;
        let lib = Self::init(name, path, &[])?;
        fs::write(path.join(MARKER_FILE), format!("{PACKAGE_VERSION}\n"))?;
        Ok(lib)
    }

    /// An in-memory library with no disk backing, for unit tests
    /// (`lib_tmp`).
    pub fn tmp() -> Library {
        let inner = Inner {
            path: PathBuf::new(),
            name: Ident::new("WORK"),
            units: Vec::new(),
            index: Vec::new(),
        };
        let lib = Library(Rc::new(RefCell::new(inner)));
        LOADED.with(|l| l.borrow_mut().push(lib.clone()));
        lib
    }

    fn init(name: &str, path: &Path, preloaded_index: &[(Ident, Kind)]) -> Result<Library, Error> {
        let index_path = path.join(INDEX_FILE);
        let index = match fs::read(&index_path) {
            Ok(bytes) => read_index(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => preloaded_index.to_vec(),
            Err(e) => return Err(Error::Io(e)),
        };
        let inner = Inner {
            path: path.to_path_buf(),
            name: upcase_name(name),
            units: Vec::new(),
            index,
        };
        let lib = Library(Rc::new(RefCell::new(inner)));
        LOADED.with(|l| l.borrow_mut().push(lib.clone()));
        Ok(lib)
    }

    fn find_at(name: &str, dir: &Path) -> Option<Library> {
        let candidate = dir.join(name.to_ascii_lowercase());
        if !candidate.is_dir() {
            return None;
        }
        if !candidate.join(MARKER_FILE).exists() {
            return None;
        }
        Self::init(name, &candidate, &[]).ok()
    }

    /// Resolve `name` to an open library (`lib_find`): already-loaded
    /// libraries first, then the directory embedded in `name`, then (if
    /// `search`) `NVC_LIBPATH` entries and the install data directory.
    pub fn find(name: &str, verbose: bool, search: bool) -> Option<Library> {
        let name_i = upcase_name(name);
        if let Some(found) = LOADED.with(|l| l.borrow().iter().find(|lib| lib.name() == name_i).cloned()) {
            return Some(found);
        }

        let (mut paths, base) = match name.rsplit_once('/') {
            Some((dir, base)) => (vec![PathBuf::from(dir)], base.to_string()),
            None => (vec![PathBuf::from(".")], name.to_string()),
        };

        if search {
            if let Some(libpath) = env::var_os("NVC_LIBPATH") {
                paths.extend(env::split_paths(&libpath));
            }
            paths.push(install_libdir());
        }

        for dir in &paths {
            if let Some(lib) = Self::find_at(&base, dir) {
                return Some(lib);
            }
        }

        if verbose {
            tracing::error!(name = %base, searched = ?paths, "library not found");
        }
        None
    }

    pub fn name(&self) -> Ident {
        self.0.borrow().name
    }

    /// Register/overwrite `unit` as dirty with a fresh mtime (`lib_put`).
    pub fn put(&self, unit: Tree) {
        let mtime = now_usecs();
        let ident = unit.ident();
        let kind = unit.kind();
        let mut inner = self.0.borrow_mut();
        match inner.units.iter_mut().find(|u| u.top.ident() == ident) {
            Some(existing) => {
                existing.top = unit;
                existing.kind = kind;
                existing.dirty = true;
                existing.mtime = mtime;
            }
            None => inner.units.push(UnitEntry {
                top: unit,
                kind,
                dirty: true,
                mtime,
            }),
        }
        match inner.index.iter_mut().find(|(n, _)| *n == ident) {
            Some(entry) => entry.1 = kind,
            None => inner.index.push((ident, kind)),
        }
    }

    /// Return the cached unit, loading it from disk on first access
    /// (`lib_get`/`lib_get_aux`).
    pub fn get(&self, ident: Ident) -> Result<Option<Tree>, Error> {
        if let Some(top) = self.0.borrow().units.iter().find(|u| u.top.ident() == ident).map(|u| u.top.clone()) {
            return Ok(Some(top));
        }

        let path = self.0.borrow().path.clone();
        if path.as_os_str().is_empty() {
            return Ok(None);
        }
        let file_path = path.join(ident.to_string());
        let bytes = match fs::read(&file_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };
        let top = tree::serialize::read(&bytes)?;
        let mtime = mtime_of(&file_path)?;
        let kind = top.kind();
        self.0.borrow_mut().units.push(UnitEntry {
            top: top.clone(),
            kind,
            dirty: false,
            mtime,
        });
        Ok(Some(top))
    }

    /// The unit's mtime, loading it if necessary (`lib_mtime`).
    pub fn mtime(&self, ident: Ident) -> Result<Option<Mtime>, Error> {
        self.get(ident)?;
        Ok(self.0.borrow().units.iter().find(|u| u.top.ident() == ident).map(|u| u.mtime))
    }

    /// Write every dirty unit to disk, then rewrite `_index` last.
    /// Atomicity is weak by design: a crash between a unit write and the
    /// index rewrite leaves a library a re-analysis away from consistent,
    /// which is accepted.
    pub fn save(&self) -> Result<(), Error> {
        let mut inner = self.0.borrow_mut();
        if inner.path.as_os_str().is_empty() {
            return Ok(());
        }
        for unit in inner.units.iter_mut() {
            if unit.dirty {
                let bytes = tree::serialize::write(&unit.top);
                fs::write(inner.path.join(unit.top.ident().to_string()), bytes)?;
                unit.dirty = false;
            }
        }
        let bytes = write_index(&inner.index);
        fs::write(inner.path.join(INDEX_FILE), bytes)?;
        Ok(())
    }

    pub fn walk_index(&self) -> Vec<(Ident, Kind)> {
        self.0.borrow().index.clone()
    }

    /// Architecture selection (`pick_arch`): an exact-name
    /// architecture wins outright; otherwise the newest-mtime prefix
    /// match wins, ties broken by the higher first source line.
    pub fn pick_arch(&self, entity: Ident) -> Result<Tree, Error> {
        if let Some(unit) = self.get(entity)? {
            if unit.kind() == Kind::Arch {
                return Ok(unit);
            }
        }

        let mut best: Option<(Tree, Mtime)> = None;
        for (name, kind) in self.walk_index() {
            if kind != Kind::Arch || name.until('-') != entity {
                continue;
            }
            let arch = self.get(name)?.ok_or(Error::NoSuchUnit(name))?;
            let mtime = self.mtime(name)?.unwrap_or(0);
            let take = match &best {
                None => true,
                Some((cur, cur_mtime)) if mtime != *cur_mtime => mtime > *cur_mtime,
                Some((cur, _)) => arch.loc().first_line > cur.loc().first_line,
            };
            if take {
                best = Some((arch, mtime));
            }
        }
        best.map(|(arch, _)| arch).ok_or(Error::NoSuchArch(entity))
    }

    /// Remove every file in the library directory and the directory
    /// itself (`lib_destroy`) — a test-only convenience.
    pub fn destroy(&self) -> Result<(), Error> {
        let path = self.0.borrow().path.clone();
        if path.as_os_str().is_empty() {
            return Ok(());
        }
        for entry in fs::read_dir(&path)? {
            fs::remove_file(entry?.path())?;
        }
        fs::remove_dir(&path)?;
        LOADED.with(|l| l.borrow_mut().retain(|lib| !Rc::ptr_eq(&lib.0, &self.0)));
        Ok(())
    }
}

pub fn work() -> Option<Library> {
    WORK.with(|w| w.borrow().clone())
}

pub fn set_work(lib: Library) {
    WORK.with(|w| *w.borrow_mut() = Some(lib));
}

fn write_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn write_ident(buf: &mut Vec<u8>, id: Ident) {
    let s = id.to_string();
    write_u32(buf, s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
}

fn write_index(index: &[(Ident, Kind)]) -> Vec<u8> {
    let mut buf = Vec::new();
    write_u32(&mut buf, index.len() as u32);
    for (name, kind) in index {
        write_ident(&mut buf, *name);
        buf.push(*kind as u8);
    }
    buf
}

fn read_u32(buf: &[u8], pos: &mut usize) -> Result<u32, Error> {
    if *pos + 4 > buf.len() {
        return Err(Error::CorruptIndex);
    }
    let v = u32::from_le_bytes(buf[*pos..*pos + 4].try_into().expect("4 bytes"));
    *pos += 4;
    Ok(v)
}

fn read_index(buf: &[u8]) -> Result<Vec<(Ident, Kind)>, Error> {
    let mut pos = 0;
    let count = read_u32(buf, &mut pos)?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = read_u32(buf, &mut pos)? as usize;
        if pos + len > buf.len() {
            return Err(Error::CorruptIndex);
        }
        let name = std::str::from_utf8(&buf[pos..pos + len]).map_err(|_| Error::CorruptIndex)?;
        let ident = Ident::new(name);
        pos += len;
        if pos >= buf.len() {
            return Err(Error::CorruptIndex);
        }
        let kind = Kind::try_from(buf[pos]).map_err(|_| Error::CorruptIndex)?;
        pos += 1;
        out.push((ident, kind));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loc::Loc;
    use crate::types::Type;

    fn mk_entity(name: &str) -> Tree {
        let ent = Tree::new(Kind::Entity);
        ent.set_ident(Ident::new(name));
        ent
    }

    fn mk_arch(name: &str, entity: &str, line: u32) -> Tree {
        let ar = Tree::new(Kind::Arch);
        ar.set_ident(Ident::new(name));
        ar.set_ident2(Ident::new(entity));
        ar.set_loc(Loc::new("top.vhd", line, 1));
        ar
    }

    #[test]
    fn put_then_get_round_trips_in_tmp_library() {
        let lib = Library::tmp();
        let ent = mk_entity("top");
        lib.put(ent.clone());
        let back = lib.get(Ident::new("top")).unwrap().unwrap();
        assert!(back.ptr_eq(&ent));
    }

    #[test]
    fn save_and_reload_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let lib_path = dir.path().join("mywork");
        let lib = Library::new(lib_path.to_str().unwrap()).unwrap();

        let sig = Tree::new(Kind::SignalDecl);
        sig.set_ident(Ident::new("top-a:s"));
        sig.set_type(Type::integer(0, 1));
        sig.add_net(0);

        let elab = Tree::new(Kind::Elab);
        elab.set_ident(Ident::new("top.elab"));
        elab.add_decl(sig);
        lib.put(elab.clone());
        lib.save().unwrap();

        drop(lib);
        let reopened = Library::find(lib_path.to_str().unwrap(), false, false).unwrap();
        let back = reopened.get(Ident::new("top.elab")).unwrap().unwrap();
        assert!(tree::serialize::structural_eq(&elab, &back));

        reopened.destroy().unwrap();
    }

    #[test]
    fn pick_arch_prefers_exact_name_match() {
        let lib = Library::tmp();
        let exact = mk_arch("top-a", "top", 1);
        lib.put(exact.clone());
        let chosen = lib.pick_arch(Ident::new("top-a")).unwrap();
        assert!(chosen.ptr_eq(&exact));
    }

    #[test]
    fn pick_arch_breaks_mtime_ties_on_higher_first_line() {
        let lib = Library::tmp();
        let older = mk_arch("top-a1", "top", 10);
        let newer_line = mk_arch("top-a2", "top", 20);
        lib.put(older);
        lib.put(newer_line.clone());
        {
            let mut inner = lib.0.borrow_mut();
            for unit in inner.units.iter_mut() {
                unit.mtime = 1000;
            }
        }
        let chosen = lib.pick_arch(Ident::new("top")).unwrap();
        assert!(chosen.ptr_eq(&newer_line));
    }
}
