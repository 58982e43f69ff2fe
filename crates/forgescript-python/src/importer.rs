//! Per-context import resolution for bundle modules.
//!
//! Every sub-context gets its own `BundleImporter`: a copy of the builtins
//! namespace whose `__import__` loads modules from the bundle directory into
//! a private table instead of `sys.modules`. Bundle modules inherit the same
//! builtins, so their own imports resolve through the same table. Names the
//! bundle does not provide fall through to the regular import system.
//! `sys.path` is never modified.

use std::ffi::CStr;

use pyo3::prelude::*;

const IMPORTER_SOURCE: &CStr = cr#"
import builtins
import importlib.machinery
import importlib.util

_builtin_import = builtins.__import__
_HOST_MODULES = frozenset({"forgescript"})


class BundleImporter:
    def __init__(self, root):
        self.root = root
        self.modules = {}
        self.builtins = dict(builtins.__dict__)
        self.builtins["__import__"] = self.import_

    def close(self):
        self.modules.clear()
        self.builtins.clear()

    def import_(self, name, globals=None, locals=None, fromlist=(), level=0):
        if level > 0:
            package = (globals or {}).get("__package__") or ""
            if package.partition(".")[0] not in self.modules:
                return _builtin_import(name, globals, locals, fromlist, level)
            absolute = importlib.util.resolve_name("." * level + name, package)
        else:
            absolute = name
            if not self._is_local(name.partition(".")[0]):
                return _builtin_import(name, globals, locals, fromlist, level)

        module = self._load(absolute)
        if fromlist:
            self._load_fromlist(module, fromlist)
            return module
        if level == 0:
            return self.modules[name.partition(".")[0]]
        return module

    def _is_local(self, top):
        if top in self.modules:
            return True
        if top in _HOST_MODULES:
            return False
        spec = importlib.machinery.PathFinder.find_spec(top, [self.root])
        if spec is None:
            return False
        if spec.origin is None:
            # A bare directory only provides the name when nothing else does.
            try:
                return importlib.util.find_spec(top) is None
            except (ImportError, ValueError):
                return False
        return True

    def _load(self, fullname):
        module = self.modules.get(fullname)
        if module is not None:
            return module

        parent, _, child = fullname.rpartition(".")
        if parent:
            parent_module = self._load(parent)
            search = getattr(parent_module, "__path__", None)
            if search is None:
                raise ModuleNotFoundError(
                    f"No module named {fullname!r}; {parent!r} is not a package",
                    name=fullname,
                )
        else:
            search = [self.root]

        spec = importlib.machinery.PathFinder.find_spec(fullname, search)
        if spec is None:
            raise ModuleNotFoundError(f"No module named {fullname!r}", name=fullname)

        module = importlib.util.module_from_spec(spec)
        module.__builtins__ = self.builtins
        self.modules[fullname] = module
        try:
            if spec.loader is not None:
                spec.loader.exec_module(module)
        except BaseException:
            del self.modules[fullname]
            raise

        if parent:
            setattr(parent_module, child, module)
        return module

    def _load_fromlist(self, module, fromlist):
        if not hasattr(module, "__path__"):
            return
        names = list(fromlist)
        if "*" in names:
            names.remove("*")
            names.extend(getattr(module, "__all__", ()))
        for item in names:
            if hasattr(module, item):
                continue
            submodule = f"{module.__name__}.{item}"
            try:
                self._load(submodule)
            except ModuleNotFoundError as e:
                if e.name != submodule:
                    raise
"#;

/// Loads the `BundleImporter` class.
pub(crate) fn importer_class(py: Python<'_>) -> PyResult<Py<PyAny>> {
    let module = PyModule::from_code(
        py,
        IMPORTER_SOURCE,
        c"<forgescript-importer>",
        c"_forgescript_importer",
    )?;
    Ok(module.getattr("BundleImporter")?.unbind())
}
