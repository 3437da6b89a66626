//! libxml2 RELAX NG engine
//!
//! Direct FFI to libxml2's RELAX NG implementation. Documents and schemas are
//! pulled through `xmlReadIO` from the session's [`InputSource`], so libxml2
//! never opens a file or URL on its own, and every structured error it raises
//! is forwarded to the operation's [`ErrorHandler`].
//!
//! libxml2 only understands the XML syntax. Compact schemas are translated
//! first (see [`crate::compact`]) and findings against the generated grammar
//! are reported at the compact source.
//!
//! ## Thread safety
//!
//! Initialisation happens once per process behind a [`Once`]. Parsing and
//! validation use per-call contexts; the parse-time error callback is
//! installed through `xmlSetStructuredErrorFunc`, which libxml2 keeps per
//! thread.

use std::ffi::{CStr, CString};
use std::io::Read;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::Once;

use libc::{c_char, c_int, c_void};
use tracing::{debug, trace};

use crate::compact;
use crate::engine::{EngineDiagnostic, ErrorHandler, InputSource, SchemaEngine, SchemaSyntax};
use crate::error::{EngineError, EngineResult};
use crate::reader::PositionReader;

static LIBXML2_INIT: Once = Once::new();

/// Forbid network access during parsing
const XML_PARSE_NONET: c_int = 1 << 11;

const XML_ERR_WARNING: c_int = 1;
const XML_ERR_FATAL: c_int = 3;

const XML_ELEMENT_NODE: c_int = 1;

// Opaque libxml2 structures
#[repr(C)]
pub struct XmlDocOpaque {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlRelaxNgOpaque {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlRelaxNgParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlRelaxNgValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct xmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    /// Column of the error in code points, 0 when unknown
    pub int2: c_int,
    pub ctxt: *mut c_void,
    pub node: *mut c_void,
}

/// Leading fields shared by every libxml2 tree node
#[repr(C)]
struct XmlNodeHead {
    _private: *mut c_void,
    node_type: c_int,
    name: *const c_char,
}

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut c_void, error: *mut xmlError)>;

pub type XmlInputReadCallback =
    Option<unsafe extern "C" fn(context: *mut c_void, buffer: *mut c_char, len: c_int) -> c_int>;

pub type XmlInputCloseCallback = Option<unsafe extern "C" fn(context: *mut c_void) -> c_int>;

pub type XmlExternalEntityLoader = Option<
    unsafe extern "C" fn(url: *const c_char, id: *const c_char, ctxt: *mut c_void) -> *mut c_void,
>;

#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub fn xmlInitParser();

    pub fn xmlSetExternalEntityLoader(f: XmlExternalEntityLoader);
    pub fn xmlSetStructuredErrorFunc(ctx: *mut c_void, handler: XmlStructuredErrorFunc);

    // Documents
    pub fn xmlReadIO(
        ioread: XmlInputReadCallback,
        ioclose: XmlInputCloseCallback,
        ioctx: *mut c_void,
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlDocOpaque;
    pub fn xmlFreeDoc(doc: *mut XmlDocOpaque);

    // Schema parsing
    pub fn xmlRelaxNGNewDocParserCtxt(doc: *mut XmlDocOpaque) -> *mut XmlRelaxNgParserCtxt;
    pub fn xmlRelaxNGSetParserStructuredErrors(
        ctxt: *mut XmlRelaxNgParserCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlRelaxNGParse(ctxt: *mut XmlRelaxNgParserCtxt) -> *mut XmlRelaxNgOpaque;
    pub fn xmlRelaxNGFreeParserCtxt(ctxt: *mut XmlRelaxNgParserCtxt);
    pub fn xmlRelaxNGFree(schema: *mut XmlRelaxNgOpaque);

    // Validation
    pub fn xmlRelaxNGNewValidCtxt(schema: *mut XmlRelaxNgOpaque) -> *mut XmlRelaxNgValidCtxt;
    pub fn xmlRelaxNGSetValidStructuredErrors(
        ctxt: *mut XmlRelaxNgValidCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlRelaxNGValidateDoc(ctxt: *mut XmlRelaxNgValidCtxt, doc: *mut XmlDocOpaque)
    -> c_int;
    pub fn xmlRelaxNGFreeValidCtxt(ctxt: *mut XmlRelaxNgValidCtxt);
}

/// Entity loader installed process-wide: every external load is refused.
unsafe extern "C" fn refuse_external_entity(
    _url: *const c_char,
    _id: *const c_char,
    _ctxt: *mut c_void,
) -> *mut c_void {
    ptr::null_mut()
}

/// Forwards libxml2 errors to an [`ErrorHandler`] and counts them.
struct Reporter<'h> {
    handler: &'h mut dyn ErrorHandler,
    reported: usize,
}

impl Reporter<'_> {
    fn as_context(&mut self) -> *mut c_void {
        self as *mut Self as *mut c_void
    }
}

fn positive(value: c_int) -> Option<u32> {
    u32::try_from(value).ok().filter(|&v| v > 0)
}

/// Local name of the element an error is attached to.
///
/// # Safety
/// `node` must be null or point to a live libxml2 tree node.
unsafe fn element_name(node: *mut c_void) -> Option<String> {
    if node.is_null() {
        return None;
    }
    let head = unsafe { &*(node as *const XmlNodeHead) };
    if head.node_type != XML_ELEMENT_NODE || head.name.is_null() {
        return None;
    }
    let name = unsafe { CStr::from_ptr(head.name) };
    Some(name.to_string_lossy().into_owned())
}

/// Callback for libxml2 to report errors (structured)
unsafe extern "C" fn structured_error_callback(user_data: *mut c_void, error: *mut xmlError) {
    if user_data.is_null() || error.is_null() {
        return;
    }
    // SAFETY: user_data is the Reporter registered for the duration of the
    // libxml2 call that is invoking us; error is valid for this callback.
    let reporter = unsafe { &mut *(user_data as *mut Reporter<'_>) };
    let error = unsafe { &*error };

    let message = if error.message.is_null() {
        None
    } else {
        let c_str = unsafe { CStr::from_ptr(error.message) };
        Some(c_str.to_string_lossy().trim().to_string())
    };
    let mut diagnostic = EngineDiagnostic {
        line: positive(error.line),
        column: positive(error.int2),
        message,
        ..EngineDiagnostic::default()
    }
    .in_code_points();
    if diagnostic.column.is_none() {
        // Validity errors carry the offending node instead of a column
        diagnostic.element = unsafe { element_name(error.node) };
    }
    trace!(level = error.level, code = error.code, ?diagnostic, "libxml2 error");

    // Unwinding out of an extern "C" fn aborts the process
    let _ = panic::catch_unwind(AssertUnwindSafe(|| match error.level {
        XML_ERR_WARNING => reporter.handler.warning(&diagnostic),
        XML_ERR_FATAL => reporter.handler.fatal_error(&diagnostic),
        _ => reporter.handler.error(&diagnostic),
    }));
    reporter.reported += 1;
}

unsafe extern "C" fn read_callback(context: *mut c_void, buffer: *mut c_char, len: c_int) -> c_int {
    if context.is_null() || buffer.is_null() || len <= 0 {
        return 0;
    }
    // SAFETY: context is the InputSource passed to xmlReadIO, which is alive
    // and exclusively borrowed for the duration of that call.
    let source = unsafe { &mut *(context as *mut InputSource<'_, '_>) };
    let buf = unsafe { std::slice::from_raw_parts_mut(buffer.cast::<u8>(), len as usize) };
    match source.read(buf) {
        Ok(n) => n as c_int,
        Err(_) => -1,
    }
}

unsafe extern "C" fn close_callback(_context: *mut c_void) -> c_int {
    0
}

/// Routes parser errors raised outside any RELAX NG context to `reporter`
/// until dropped.
struct ErrorScope<'r, 'h> {
    _reporter: PhantomData<&'r mut Reporter<'h>>,
}

impl<'r, 'h> ErrorScope<'r, 'h> {
    fn install(reporter: &'r mut Reporter<'h>) -> Self {
        unsafe { xmlSetStructuredErrorFunc(reporter.as_context(), Some(structured_error_callback)) };
        Self {
            _reporter: PhantomData,
        }
    }
}

impl Drop for ErrorScope<'_, '_> {
    fn drop(&mut self) {
        unsafe { xmlSetStructuredErrorFunc(ptr::null_mut(), None) };
    }
}

/// An owned libxml2 document, freed on drop.
struct XmlDoc {
    ptr: *mut XmlDocOpaque,
}

impl Drop for XmlDoc {
    fn drop(&mut self) {
        unsafe { xmlFreeDoc(self.ptr) };
    }
}

/// A compiled RELAX NG grammar, freed on drop.
#[derive(Debug)]
pub struct RelaxNgSchema {
    ptr: *mut XmlRelaxNgOpaque,
}

impl Drop for RelaxNgSchema {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { xmlRelaxNGFree(self.ptr) };
            self.ptr = ptr::null_mut();
        }
    }
}

/// [`SchemaEngine`] backed by libxml2.
#[derive(Debug)]
pub struct LibXml2Engine {
    _phantom: PhantomData<()>,
}

impl LibXml2Engine {
    /// Initialise libxml2 (once per process) and refuse external entities
    /// from then on.
    pub fn new() -> Self {
        LIBXML2_INIT.call_once(|| unsafe {
            xmlInitParser();
            xmlSetExternalEntityLoader(Some(refuse_external_entity));
        });

        LibXml2Engine {
            _phantom: PhantomData,
        }
    }

    /// Parse the source into a document tree, reporting well-formedness
    /// errors through `reporter`.
    fn read_document(
        &self,
        source: &mut InputSource<'_, '_>,
        reporter: &mut Reporter<'_>,
    ) -> EngineResult<XmlDoc> {
        let encoding = CString::new(source.encoding())
            .map_err(|_| EngineError::Unsupported(source.encoding().to_string()))?;
        let context = source as *mut InputSource<'_, '_> as *mut c_void;

        let doc = {
            let _scope = ErrorScope::install(reporter);
            unsafe {
                xmlReadIO(
                    Some(read_callback),
                    Some(close_callback),
                    context,
                    ptr::null(),
                    encoding.as_ptr(),
                    XML_PARSE_NONET,
                )
            }
        };

        if doc.is_null() {
            return Err(EngineError::parse("document is not well-formed"));
        }
        Ok(XmlDoc { ptr: doc })
    }

    /// Compile a schema in XML syntax.
    fn compile_xml(
        &self,
        source: &mut InputSource<'_, '_>,
        handler: &mut dyn ErrorHandler,
    ) -> EngineResult<Option<RelaxNgSchema>> {
        let mut reporter = Reporter {
            handler,
            reported: 0,
        };
        let doc = self.read_document(source, &mut reporter)?;

        let schema = unsafe {
            // The parser context works on its own copy of the document
            let ctxt = xmlRelaxNGNewDocParserCtxt(doc.ptr);
            if ctxt.is_null() {
                return Err(EngineError::Allocation {
                    what: "RELAX NG parser context",
                });
            }
            xmlRelaxNGSetParserStructuredErrors(
                ctxt,
                Some(structured_error_callback),
                reporter.as_context(),
            );
            let schema = {
                let _scope = ErrorScope::install(&mut reporter);
                xmlRelaxNGParse(ctxt)
            };
            xmlRelaxNGFreeParserCtxt(ctxt);
            schema
        };

        if schema.is_null() {
            debug!(reported = reporter.reported, "schema rejected");
            if reporter.reported == 0 {
                return Err(EngineError::parse("schema could not be compiled"));
            }
            return Ok(None);
        }
        Ok(Some(RelaxNgSchema { ptr: schema }))
    }

    /// Translate a compact schema and compile the result, reporting findings
    /// at the compact source.
    fn compile_compact(
        &self,
        source: &mut InputSource<'_, '_>,
        handler: &mut dyn ErrorHandler,
    ) -> EngineResult<Option<RelaxNgSchema>> {
        let mut bytes = Vec::with_capacity(source.remaining());
        source.read_to_end(&mut bytes)?;
        let text = String::from_utf8(bytes)
            .map_err(|_| EngineError::parse("compact schema is not valid UTF-8"))?;

        let translation = match compact::translate(&text) {
            Ok(translation) => translation,
            Err(err) => {
                debug!(error = %err, "compact schema rejected");
                handler.fatal_error(&err.diagnostic());
                return Err(EngineError::parse("compact schema could not be parsed"));
            }
        };
        debug!(lines = translation.line_count(), "translated compact schema");

        let mut reader = PositionReader::new(translation.xml().as_bytes());
        let mut generated = InputSource::utf8(&mut reader);
        let mut mapped = translation.remap(handler);
        self.compile_xml(&mut generated, &mut mapped)
    }
}

impl Default for LibXml2Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaEngine for LibXml2Engine {
    type Schema = RelaxNgSchema;

    fn compile(
        &self,
        source: &mut InputSource<'_, '_>,
        syntax: SchemaSyntax,
        handler: &mut dyn ErrorHandler,
    ) -> EngineResult<Option<RelaxNgSchema>> {
        match syntax {
            SchemaSyntax::Xml => self.compile_xml(source, handler),
            SchemaSyntax::Compact => self.compile_compact(source, handler),
        }
    }

    fn validate(
        &self,
        schema: &RelaxNgSchema,
        source: &mut InputSource<'_, '_>,
        handler: &mut dyn ErrorHandler,
    ) -> EngineResult<bool> {
        let mut reporter = Reporter {
            handler,
            reported: 0,
        };
        let doc = self.read_document(source, &mut reporter)?;

        let code = unsafe {
            let ctxt = xmlRelaxNGNewValidCtxt(schema.ptr);
            if ctxt.is_null() {
                return Err(EngineError::Allocation {
                    what: "RELAX NG validation context",
                });
            }
            xmlRelaxNGSetValidStructuredErrors(
                ctxt,
                Some(structured_error_callback),
                reporter.as_context(),
            );
            let code = xmlRelaxNGValidateDoc(ctxt, doc.ptr);
            xmlRelaxNGFreeValidCtxt(ctxt);
            code
        };

        match code {
            0 => Ok(true),
            n if n > 0 => {
                debug!(reported = reporter.reported, "document invalid");
                Ok(false)
            }
            n => Err(EngineError::Internal { code: n }),
        }
    }
}
