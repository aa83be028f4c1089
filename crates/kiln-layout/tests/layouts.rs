//! Integration test: struct types and bitfield arrays against a live
//! memory context.

use kiln_core::MemError;
use kiln_layout::{define_heap_struct, define_stack_struct, BitfieldArray, Value};
use kiln_test_utils::assert_pool_invariants;
use kiln_test_utils::fixtures::{small_memory, MIXED_FIELDS, PARTICLE_FIELDS};

#[test]
fn mixed_fields_follow_natural_alignment() {
    let mem = small_memory();
    let ty = define_heap_struct(&mem, MIXED_FIELDS).unwrap();
    assert_eq!(ty.offset_of("a").unwrap(), 0);
    assert_eq!(ty.offset_of("b").unwrap(), 4);
    assert_eq!(ty.offset_of("c").unwrap(), 8);
    assert_eq!(ty.offset_of("d").unwrap(), 16);
    assert_eq!(ty.size(), 24);
}

#[test]
fn many_instances_do_not_overlap() {
    let mut mem = small_memory();
    let ty = define_heap_struct(&mem, MIXED_FIELDS).unwrap();
    let a = ty.scalar::<u8>("a").unwrap();
    let d = ty.scalar::<f64>("d").unwrap();

    let objs: Vec<_> = (0..10).map(|_| ty.allocate(&mut mem).unwrap()).collect();
    for (i, obj) in objs.iter().enumerate() {
        a.store(mem.space(), obj.ptr(), i as u8);
        d.store(mem.space(), obj.ptr(), i as f64 * 1.5);
    }
    for (i, obj) in objs.iter().enumerate() {
        assert_eq!(a.load(mem.space(), obj.ptr()), i as u8);
        assert_eq!(d.load(mem.space(), obj.ptr()), i as f64 * 1.5);
    }
    for obj in objs {
        obj.deallocate(&mut mem).unwrap();
    }
    assert_pool_invariants(mem.pool());
}

#[test]
fn particle_strings_are_owned_by_the_instance() {
    let mut mem = small_memory();
    let baseline = mem.reserved();
    let ty = define_heap_struct(&mem, PARTICLE_FIELDS).unwrap();
    let obj = ty.allocate(&mut mem).unwrap();

    obj.set(&mut mem, "label", "electron").unwrap();
    obj.set(&mut mem, "label", "positron").unwrap();
    obj.set(&mut mem, "charge", -1.0f32).unwrap();
    obj.set(&mut mem, "alpha", 1.0f32).unwrap();

    assert_eq!(obj.get(mem.space(), "label").unwrap(), Value::Str("positron".into()));
    assert_eq!(obj.get(mem.space(), "charge").unwrap(), Value::F32(-1.0));
    assert_eq!(obj.get(mem.space(), "alpha").unwrap(), Value::F32(1.0));

    obj.deallocate(&mut mem).unwrap();
    assert_eq!(mem.reserved(), baseline);
    assert_pool_invariants(mem.pool());
}

#[test]
fn stack_struct_discipline() {
    let mut mem = small_memory();
    let ty = define_stack_struct(&mem, &[("x", "i32"), ("y", "i32")]).unwrap();
    let before = mem.stack().pointer();

    let outer = ty.allocate(&mut mem).unwrap();
    let inner = ty.allocate(&mut mem).unwrap();
    assert!(inner.ptr().0 >= outer.ptr().0 + ty.size() as u32);
    inner.deallocate(&mut mem).unwrap();
    outer.deallocate(&mut mem).unwrap();
    assert_eq!(mem.stack().pointer(), before);
}

#[test]
fn heap_exhaustion_is_out_of_memory() {
    let mut mem = small_memory();
    let ty = define_heap_struct(&mem, &[("blob", "f64")]).unwrap();
    let mut objs = Vec::new();
    let err = loop {
        match ty.allocate(&mut mem) {
            Ok(obj) => objs.push(obj),
            Err(err) => break err,
        }
    };
    assert!(matches!(err, MemError::OutOfMemory { .. }));
    assert_eq!(objs.len(), 1024 / 8);
    for obj in objs {
        obj.deallocate(&mut mem).unwrap();
    }
}

#[test]
fn bitfield_backed_by_heap() {
    let mut mem = small_memory();
    let arr = BitfieldArray::allocate(&mut mem, 100, 13).unwrap();
    assert_eq!(mem.pool().allocation_size(arr.base()), Some(168));
    for i in 0..arr.len() {
        arr.store(mem.space(), i, (i as u32 * 97) % 8192);
    }
    for i in 0..arr.len() {
        assert_eq!(arr.load(mem.space(), i), (i as u32 * 97) % 8192);
    }
    mem.free(arr.base()).unwrap();
}
