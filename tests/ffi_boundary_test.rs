//! The exported C functions, called the way a host would call them

mod common;

use std::ffi::CString;
use std::ptr;

use common::test_helpers::{DOC_SCHEMA_RNC, DOC_SCHEMA_RNG, Fixtures, INVALID_DOC, VALID_DOC};
use libc::c_int;
use validate_rng::Status;
use validate_rng::ffi::{
    RelaxngSession, relaxng_free, relaxng_init, relaxng_load_schema, relaxng_unload_schema,
    relaxng_validate,
};
use validate_rng::sink::{MIN_CAPACITY, TRUNCATION_RECORD};

fn terminated(buffer: &[u8]) -> &[u8] {
    let end = buffer.iter().position(|&b| b == 0).unwrap();
    &buffer[..end]
}

#[test]
fn test_smallest_region_truncates_every_finding() {
    let mut buffer = vec![0xAAu8; MIN_CAPACITY + 8];
    let len = buffer.len() as c_int;
    let name = CString::new("doc").unwrap();
    let mut session: *mut RelaxngSession = ptr::null_mut();
    unsafe {
        assert_eq!(relaxng_init(&mut session, buffer.as_mut_ptr().cast(), len), 0);
        assert_eq!(buffer[0], 0);

        let ret = relaxng_load_schema(
            session,
            name.as_ptr(),
            DOC_SCHEMA_RNG.as_ptr().cast(),
            DOC_SCHEMA_RNG.len() as c_int,
            0,
        );
        assert_eq!(ret, 0);

        let ret = relaxng_validate(
            session,
            name.as_ptr(),
            INVALID_DOC.as_ptr().cast(),
            INVALID_DOC.len() as c_int,
        );
        assert_eq!(ret as usize, TRUNCATION_RECORD.len());
        assert!(ret < len);
        assert_eq!(buffer[ret as usize], 0);
        relaxng_free(session);
    }
    assert_eq!(terminated(&buffer), TRUNCATION_RECORD);
}

#[test]
fn test_path_mode_round_trip() {
    let fixtures = Fixtures::new();
    let schema = fixtures.write("doc.rng", DOC_SCHEMA_RNG);
    let doc = fixtures.write("invalid.xml", INVALID_DOC);
    let schema = CString::new(schema.to_str().unwrap()).unwrap();
    let doc = CString::new(doc.to_str().unwrap()).unwrap();
    let name = CString::new("doc").unwrap();

    let mut buffer = vec![0u8; 4096];
    let mut session: *mut RelaxngSession = ptr::null_mut();
    unsafe {
        relaxng_init(&mut session, buffer.as_mut_ptr().cast(), 4096);
        assert_eq!(relaxng_load_schema(session, name.as_ptr(), schema.as_ptr(), -1, 0), 0);

        let ret = relaxng_validate(session, name.as_ptr(), doc.as_ptr(), -1);
        assert!(ret > 0);
        assert_eq!(terminated(&buffer).len(), ret as usize);
        let text = std::str::from_utf8(terminated(&buffer)).unwrap();
        assert!(text.contains(":3:"), "unexpected output: {}", text);

        assert_eq!(relaxng_unload_schema(session, name.as_ptr()), 0);
        assert_eq!(buffer[0], 0);
        assert_eq!(
            relaxng_validate(session, name.as_ptr(), doc.as_ptr(), -1),
            Status::API_ERROR
        );
        relaxng_free(session);
    }
}

#[test]
fn test_sessions_do_not_share_schemas() {
    let name = CString::new("doc").unwrap();
    let doc = b"<doc/>";
    let mut first_buffer = vec![0u8; 1024];
    let mut second_buffer = vec![0u8; 1024];
    let mut first: *mut RelaxngSession = ptr::null_mut();
    let mut second: *mut RelaxngSession = ptr::null_mut();
    unsafe {
        relaxng_init(&mut first, first_buffer.as_mut_ptr().cast(), 1024);
        relaxng_init(&mut second, second_buffer.as_mut_ptr().cast(), 1024);

        let ret = relaxng_load_schema(
            first,
            name.as_ptr(),
            DOC_SCHEMA_RNG.as_ptr().cast(),
            DOC_SCHEMA_RNG.len() as c_int,
            0,
        );
        assert_eq!(ret, 0);
        assert_eq!(
            relaxng_validate(first, name.as_ptr(), doc.as_ptr().cast(), doc.len() as c_int),
            0
        );
        assert_eq!(
            relaxng_validate(second, name.as_ptr(), doc.as_ptr().cast(), doc.len() as c_int),
            Status::API_ERROR
        );

        relaxng_free(first);
        relaxng_free(second);
    }
    assert_eq!(terminated(&first_buffer), b"");
    assert_eq!(terminated(&second_buffer), b"schema 'doc' not loaded");
}

#[test]
fn test_back_to_back_failures_report_their_own_codes() {
    let fixtures = Fixtures::new();
    let missing = CString::new(fixtures.missing("absent.xml").to_str().unwrap()).unwrap();
    let name = CString::new("doc").unwrap();
    let unknown = CString::new("unknown").unwrap();

    let mut buffer = vec![0u8; 1024];
    let mut session: *mut RelaxngSession = ptr::null_mut();
    unsafe {
        relaxng_init(&mut session, buffer.as_mut_ptr().cast(), 1024);
        let ret = relaxng_load_schema(
            session,
            name.as_ptr(),
            DOC_SCHEMA_RNC.as_ptr().cast(),
            DOC_SCHEMA_RNC.len() as c_int,
            1,
        );
        assert_eq!(ret, 0);

        assert_eq!(
            relaxng_validate(session, name.as_ptr(), missing.as_ptr(), -1),
            Status::FILE_NOT_FOUND_ERROR
        );
        assert_eq!(
            relaxng_validate(session, unknown.as_ptr(), missing.as_ptr(), -1),
            Status::API_ERROR
        );
        assert_eq!(terminated(&buffer), b"schema 'unknown' not loaded");

        assert_eq!(
            relaxng_validate(session, ptr::null(), missing.as_ptr(), -1),
            Status::API_ERROR
        );
        assert_eq!(
            relaxng_load_schema(session, name.as_ptr(), missing.as_ptr(), -1, 1),
            Status::FILE_NOT_FOUND_ERROR
        );
        assert_eq!(
            relaxng_validate(session, unknown.as_ptr(), missing.as_ptr(), -1),
            Status::API_ERROR
        );

        let ret = relaxng_validate(
            session,
            name.as_ptr(),
            VALID_DOC.as_ptr().cast(),
            VALID_DOC.len() as c_int,
        );
        assert_eq!(ret, 0);
        assert_eq!(buffer[0], 0);
        relaxng_free(session);
    }
}
